//! Headless page model
//!
//! Parses an HTML snapshot with `scraper` and answers [`Dom`] queries from it.
//! Layout is approximated from inline styles: `display`, `visibility`,
//! `opacity`, `width` and `height` are read from the `style` attribute, the
//! `hidden` attribute means `display: none`, and a hidden or undisplayed
//! ancestor collapses the box of everything below it.
//!
//! Subtrees can be detached and re-attached to model banners that are
//! injected or removed after load.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

use crate::dom::{ComputedStyle, Dom, Rect};
use crate::error::{ActivationError, MatchError};

const DEFAULT_WIDTH: f64 = 120.0;
const DEFAULT_HEIGHT: f64 = 32.0;

/// Element index in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct InlineStyle {
    display: Option<String>,
    visibility: Option<String>,
    opacity: Option<f32>,
    width: Option<f64>,
    height: Option<f64>,
}

impl InlineStyle {
    fn parse(style: &str) -> Self {
        let mut parsed = InlineStyle::default();

        for declaration in style.split(';') {
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            let name = name.trim().to_lowercase();
            let value = value.trim().trim_end_matches("!important").trim().to_lowercase();

            match name.as_str() {
                "display" => parsed.display = Some(value),
                "visibility" => parsed.visibility = Some(value),
                "opacity" => parsed.opacity = value.parse().ok(),
                "width" => parsed.width = parse_length(&value),
                "height" => parsed.height = parse_length(&value),
                _ => {}
            }
        }

        parsed
    }
}

fn parse_length(value: &str) -> Option<f64> {
    value.trim_end_matches("px").trim().parse().ok()
}

#[derive(Debug, Clone)]
struct ElementInfo {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    text: String,
    style: InlineStyle,
}

impl ElementInfo {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_undisplayed(&self) -> bool {
        self.attr("hidden").is_some() || self.style.display.as_deref() == Some("none")
    }
}

pub struct HtmlPage {
    html: Html,
    elements: Vec<ElementInfo>,
    /// Roots of detached subtrees
    detached: HashSet<usize>,
    /// Elements whose activation the host refuses
    blocked: HashSet<usize>,
    clicks: Vec<NodeHandle>,
}

impl HtmlPage {
    /// Parse a full HTML document
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let mut elements = Vec::new();
        index_subtree(html.root_element(), None, &mut elements);

        tracing::debug!(elements = elements.len(), "Parsed page snapshot");

        Self {
            html,
            elements,
            detached: HashSet::new(),
            blocked: HashSet::new(),
            clicks: Vec::new(),
        }
    }

    /// First element (attached or not) matching a selector
    pub fn find(&self, selector: &str) -> Option<NodeHandle> {
        let sel = Selector::parse(selector).ok()?;
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .position(|el| sel.matches(&el))
            .map(NodeHandle)
    }

    /// Remove a subtree from the document
    pub fn detach(&mut self, node: NodeHandle) {
        self.detached.insert(node.0);
    }

    /// Insert a previously detached subtree back into the document
    pub fn attach(&mut self, node: NodeHandle) {
        self.detached.remove(&node.0);
    }

    /// Make the host refuse to activate this element
    pub fn block_activation(&mut self, node: NodeHandle) {
        self.blocked.insert(node.0);
    }

    /// Elements clicked so far, in order
    pub fn clicks(&self) -> &[NodeHandle] {
        &self.clicks
    }

    pub fn is_attached(&self, node: NodeHandle) -> bool {
        self.ancestry(node.0).all(|idx| !self.detached.contains(&idx))
    }

    /// The element itself followed by its ancestors
    fn ancestry(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(idx), move |&i| {
            self.elements.get(i).and_then(|info| info.parent)
        })
        .filter(move |&i| i < self.elements.len())
    }

    fn info(&self, node: NodeHandle) -> Option<&ElementInfo> {
        self.elements.get(node.0)
    }
}

fn index_subtree(element: ElementRef<'_>, parent: Option<usize>, out: &mut Vec<ElementInfo>) {
    let value = element.value();
    let attrs: Vec<(String, String)> = value
        .attrs()
        .map(|(name, val)| (name.to_string(), val.to_string()))
        .collect();
    let style = attrs
        .iter()
        .find(|(name, _)| name == "style")
        .map(|(_, css)| InlineStyle::parse(css))
        .unwrap_or_default();

    let tag = value.name().to_lowercase();
    let text = if tag == "input" {
        value.attr("value").map(normalize_whitespace).unwrap_or_default()
    } else {
        normalize_whitespace(&element.text().collect::<String>())
    };

    let index = out.len();
    out.push(ElementInfo {
        tag,
        attrs,
        parent,
        text,
        style,
    });

    for child in element.children().filter_map(ElementRef::wrap) {
        index_subtree(child, Some(index), out);
    }
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Dom for HtmlPage {
    type Node = NodeHandle;

    fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, MatchError> {
        let sel = Selector::parse(selector).map_err(|e| MatchError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("{:?}", e),
        })?;

        Ok(self
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .enumerate()
            .filter(|(_, el)| sel.matches(el))
            .map(|(idx, _)| NodeHandle(idx))
            .filter(|node| self.is_attached(*node))
            .collect())
    }

    fn tag_name(&self, node: NodeHandle) -> String {
        self.info(node).map(|i| i.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<String> {
        self.info(node)?.attr(name).map(str::to_string)
    }

    fn attribute_names(&self, node: NodeHandle) -> Vec<String> {
        self.info(node)
            .map(|i| i.attrs.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn text_content(&self, node: NodeHandle) -> String {
        self.info(node).map(|i| i.text.clone()).unwrap_or_default()
    }

    fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.info(node)?.parent.map(NodeHandle)
    }

    fn bounding_box(&self, node: NodeHandle) -> Rect {
        let Some(info) = self.info(node) else {
            return Rect::default();
        };

        if !self.is_attached(node)
            || self
                .ancestry(node.0)
                .any(|idx| self.elements[idx].is_undisplayed())
        {
            return Rect::default();
        }

        Rect::new(
            0.0,
            0.0,
            info.style.width.unwrap_or(DEFAULT_WIDTH),
            info.style.height.unwrap_or(DEFAULT_HEIGHT),
        )
    }

    fn computed_style(&self, node: NodeHandle) -> ComputedStyle {
        let Some(info) = self.info(node) else {
            return ComputedStyle::default();
        };

        let display = if info.is_undisplayed() {
            "none".to_string()
        } else {
            info.style
                .display
                .clone()
                .unwrap_or_else(|| ComputedStyle::default().display)
        };

        // visibility is inherited
        let visibility = self
            .ancestry(node.0)
            .find_map(|idx| self.elements[idx].style.visibility.clone())
            .unwrap_or_else(|| ComputedStyle::default().visibility);

        ComputedStyle {
            display,
            visibility,
            opacity: info.style.opacity.unwrap_or(1.0),
        }
    }

    fn click(&mut self, node: NodeHandle) -> Result<(), ActivationError> {
        if node.0 >= self.elements.len() || !self.is_attached(node) {
            return Err(ActivationError::Detached);
        }
        if self.blocked.contains(&node.0) {
            return Err(ActivationError::Rejected(
                "pointer events intercepted".to_string(),
            ));
        }

        self.clicks.push(node);
        tracing::trace!(node = node.0, "Clicked element");
        Ok(())
    }
}
