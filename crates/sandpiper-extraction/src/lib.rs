//! Extraction strategies for Sandpiper.
//!
//! One strategy per [`ExtractionKind`](sandpiper_types::ExtractionKind):
//! HTML markup, computed CSS, and schema-mapped JSON. Strategies share the
//! shape `extract(page, selector, options) -> StrategyOutput`, never mutate
//! the page, and treat a selector with zero matches as an empty result.
//!
//! Each strategy generates a small in-page script and post-processes the
//! returned value in Rust; both halves are pure functions, so the logic is
//! testable without a browser. The [`StrategyRegistry`] maps kinds to
//! strategies explicitly at startup.

mod css;
mod errors;
mod html;
mod json;
mod registry;
mod script;

pub use css::CssStrategy;
pub use errors::{ExtractError, ExtractResult};
pub use html::HtmlStrategy;
pub use json::JsonStrategy;
pub use registry::{ExtractionStrategy, StrategyRegistry};
