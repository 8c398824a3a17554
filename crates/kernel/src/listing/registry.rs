//! Filter registry: validates a request value against its definition and
//! hands it to the matching strategy.

use std::collections::HashMap;

use serde_json::Value;

use super::definitions::FilterDefinition;
use super::resolver::{QueryBuild, ResolutionError};
use super::strategy::{FilterStrategy, StrategyKind};
use super::value::parse_filter_value;

/// Strategy table keyed by [`StrategyKind`].
///
/// Every kind starts with its built-in strategy; any of them can be
/// replaced with [`FilterRegistry::with_strategy`].
pub struct FilterRegistry {
    strategies: HashMap<StrategyKind, Box<dyn FilterStrategy>>,
}

impl FilterRegistry {
    /// Registry with every built-in strategy.
    pub fn new() -> Self {
        let strategies = StrategyKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.builtin()))
            .collect();
        Self { strategies }
    }

    /// Replace the strategy used for `kind`.
    pub fn with_strategy(mut self, kind: StrategyKind, strategy: Box<dyn FilterStrategy>) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    /// Strategy currently registered for `kind`.
    pub fn strategy(&self, kind: StrategyKind) -> Option<&dyn FilterStrategy> {
        self.strategies.get(&kind).map(AsRef::as_ref)
    }

    /// Apply one request value for `definition`.
    ///
    /// Returns `Ok(true)` when a predicate was added and `Ok(false)` when the
    /// value was dropped. Only relationship resolution failures are errors.
    pub fn apply(
        &self,
        build: &mut QueryBuild<'_>,
        definition: &FilterDefinition,
        raw: &Value,
    ) -> Result<bool, ResolutionError> {
        let Some(filter) = parse_filter_value(definition, raw) else {
            tracing::debug!(filter = %definition.name, "dropping blank or malformed filter value");
            return Ok(false);
        };

        if !definition.allows(filter.operator) {
            tracing::debug!(
                filter = %definition.name,
                operator = %filter.operator,
                "dropping filter with disallowed operator"
            );
            return Ok(false);
        }

        let kind = StrategyKind::for_filter(definition.filter_type, filter.operator);
        let Some(strategy) = self.strategy(kind) else {
            tracing::debug!(filter = %definition.name, ?kind, "no strategy registered");
            return Ok(false);
        };

        let column =
            build.resolve_column(definition.relationship_path(), definition.column_name())?;

        let applied = strategy.apply(build.query_mut(), &column, &filter, definition);
        if !applied {
            tracing::debug!(
                filter = %definition.name,
                operator = %filter.operator,
                "filter value could not be used"
            );
        }
        Ok(applied)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
