//! Optout DOM Layer
//!
//! The orchestrator never touches a browser directly. Everything it needs from
//! a page goes through the [`Dom`] trait:
//! - selector queries
//! - attribute, text and ancestry introspection
//! - computed style and bounding box
//! - element activation (click)
//!
//! [`HtmlPage`] implements the trait over a parsed HTML snapshot and is what
//! hosts without a live engine (and every test) use.

mod dom;
mod error;
mod html;
mod matcher;

pub use dom::{ComputedStyle, Dom, Rect};
pub use error::{ActivationError, MatchError};
pub use html::{HtmlPage, NodeHandle};
pub use matcher::{ElementMatcher, DEFAULT_TEXT_SCOPE};
