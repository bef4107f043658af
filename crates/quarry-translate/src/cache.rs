//! Memoized translation.

use dashmap::DashMap;
use quarry_bytecode::{CodeObject, Const, Function};
use quarry_qir::Expression;

use crate::error::TranslateError;
use crate::resolve::Bindings;

type Snapshot = Vec<(String, Const)>;

/// A concurrency-safe memo for translated functions, keyed by the code
/// object and the closure snapshot taken at translation time.
///
/// Entries are never invalidated: translation is pure, so a key always
/// maps to the same term. A cache instance assumes one fixed `Bindings`
/// table; use separate caches for separate tables.
#[derive(Default)]
pub struct TranslationCache {
    inner: DashMap<(CodeObject, Snapshot), Expression>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Translate through the cache.
    pub fn translate(
        &self,
        function: &Function,
        bindings: &Bindings,
    ) -> Result<Expression, TranslateError> {
        let key = (function.code.clone(), function.cells.clone());
        if let Some(hit) = self.inner.get(&key) {
            tracing::trace!(function = %function.code.name, "translation cache hit");
            return Ok(hit.clone());
        }

        let expr = crate::translate(function, bindings)?;
        self.inner.insert(key, expr.clone());
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
