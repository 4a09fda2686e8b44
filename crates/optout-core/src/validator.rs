//! Context validation
//!
//! Decides whether a matched element is safe to click. Exclusion is checked
//! first and always wins: a "Subscribe" button inside a cookie banner is still
//! a subscribe button. Only then is cookie relevance required, either on the
//! element itself or on one of its nearest ancestors.

use optout_dom::Dom;
use optout_rules::KeywordSet;

/// Own attributes inspected on the candidate element
const OWN_ATTRIBUTES: &[&str] = &[
    "class",
    "id",
    "aria-label",
    "data-testid",
    "data-test-id",
    "title",
    "name",
    "value",
];

#[derive(Debug, Clone)]
pub struct ContextValidator {
    exclusion: KeywordSet,
    cookie: KeywordSet,
    ancestor_depth: usize,
}

impl ContextValidator {
    pub fn new(exclusion: KeywordSet, cookie: KeywordSet, ancestor_depth: usize) -> Self {
        Self {
            exclusion,
            cookie,
            ancestor_depth,
        }
    }

    pub fn with_depth(ancestor_depth: usize) -> Self {
        Self::new(
            KeywordSet::exclusion(),
            KeywordSet::cookie_relevance(),
            ancestor_depth,
        )
    }

    /// Non-zero box, displayed, not hidden, not fully transparent
    pub fn is_visible<D: Dom>(&self, dom: &D, node: D::Node) -> bool {
        let rect = dom.bounding_box(node);
        let style = dom.computed_style(node);

        rect.has_area()
            && style.display != "none"
            && style.visibility != "hidden"
            && style.opacity > 0.0
    }

    pub fn is_safe_to_activate<D: Dom>(&self, dom: &D, node: D::Node) -> bool {
        let own = own_fields(dom, node);

        if let Some(keyword) = own.iter().find_map(|f| self.exclusion.find_in(f)) {
            tracing::debug!(node = ?node, keyword = %keyword, "Excluded candidate");
            return false;
        }

        if self.cookie.matches_any(own.iter().map(String::as_str)) {
            return true;
        }

        let mut current = dom.parent(node);
        for _ in 0..self.ancestor_depth {
            let Some(ancestor) = current else {
                break;
            };
            if self
                .cookie
                .matches_any(ancestor_fields(dom, ancestor).iter().map(String::as_str))
            {
                return true;
            }
            current = dom.parent(ancestor);
        }

        tracing::debug!(node = ?node, "No cookie context for candidate");
        false
    }

    /// Cookie relevance of a node's own text, class and id
    pub fn is_cookie_relevant<D: Dom>(&self, dom: &D, node: D::Node) -> bool {
        self.cookie.matches_any([
            dom.text_content(node).as_str(),
            dom.class_name(node).as_str(),
            dom.element_id(node).as_str(),
        ])
    }
}

impl Default for ContextValidator {
    fn default() -> Self {
        Self::with_depth(5)
    }
}

fn own_fields<D: Dom>(dom: &D, node: D::Node) -> Vec<String> {
    let mut fields = vec![dom.text_content(node), dom.tag_name(node)];
    fields.extend(OWN_ATTRIBUTES.iter().filter_map(|name| dom.attribute(node, name)));
    fields
}

/// Attribute values (and `data-*` names) of an ancestor; text is left out
/// since it includes the candidate's siblings
fn ancestor_fields<D: Dom>(dom: &D, node: D::Node) -> Vec<String> {
    let mut fields = Vec::new();
    for name in dom.attribute_names(node) {
        if name == "style" {
            continue;
        }
        if let Some(value) = dom.attribute(node, &name) {
            fields.push(value);
        }
        if name.starts_with("data-") {
            fields.push(name);
        }
    }
    fields
}
