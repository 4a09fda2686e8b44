//! Host DOM boundary

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{ActivationError, MatchError};

/// Rendered bounding box in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// The subset of computed style relevant to interactability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f32,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

/// Everything the orchestrator needs from a live document.
///
/// Implementations are driven from a single thread; `click` is the only
/// mutating operation.
pub trait Dom {
    /// Stable identity of an element for the lifetime of the page
    type Node: Copy + Eq + Hash + Debug;

    /// All attached elements matching a native selector, in document order
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, MatchError>;

    /// Lower-cased tag name
    fn tag_name(&self, node: Self::Node) -> String;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<String>;

    fn attribute_names(&self, node: Self::Node) -> Vec<String>;

    /// Rendered text of the element and its descendants, whitespace collapsed
    fn text_content(&self, node: Self::Node) -> String;

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    fn bounding_box(&self, node: Self::Node) -> Rect;

    fn computed_style(&self, node: Self::Node) -> ComputedStyle;

    fn click(&mut self, node: Self::Node) -> Result<(), ActivationError>;

    fn class_name(&self, node: Self::Node) -> String {
        self.attribute(node, "class").unwrap_or_default()
    }

    fn element_id(&self, node: Self::Node) -> String {
        self.attribute(node, "id").unwrap_or_default()
    }
}
