//! Explicit kind -> strategy registry.

use crate::css::CssStrategy;
use crate::errors::ExtractResult;
use crate::html::HtmlStrategy;
use crate::json::JsonStrategy;
use async_trait::async_trait;
use chromiumoxide::Page;
use sandpiper_types::{ExtractionKind, ExtractionOptions, StrategyOutput};
use std::collections::HashMap;
use std::sync::Arc;

/// One extraction kind's implementation.
///
/// Implementations must be read-only against the page (beyond what reading
/// computed styles inherently does) and idempotent for the same page state.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn kind(&self) -> ExtractionKind;

    async fn extract(
        &self,
        page: &Page,
        selector: &str,
        options: &ExtractionOptions,
    ) -> ExtractResult<StrategyOutput>;
}

/// Strategies registered at startup; no reflection, no discovery.
pub struct StrategyRegistry {
    strategies: HashMap<ExtractionKind, Arc<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry holding the three built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HtmlStrategy::new()));
        registry.register(Arc::new(CssStrategy::new()));
        registry.register(Arc::new(JsonStrategy::new()));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: ExtractionKind) -> Option<&Arc<dyn ExtractionStrategy>> {
        self.strategies.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ExtractionKind> {
        self.strategies.keys().copied().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_kind() {
        let registry = StrategyRegistry::with_defaults();
        for kind in [ExtractionKind::Html, ExtractionKind::Css, ExtractionKind::Json] {
            let strategy = registry.get(kind).expect("strategy registered");
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn empty_registry_has_no_strategies() {
        let registry = StrategyRegistry::new();
        assert!(registry.get(ExtractionKind::Html).is_none());
        assert!(registry.kinds().is_empty());
    }
}
