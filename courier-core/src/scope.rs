//! Layered variable scopes.
//!
//! Four scopes with increasing precedence: global < environment <
//! collection < data. Lookups resolve via the highest-precedence scope
//! that defines the key. The store is exclusively owned by the run and
//! handed to the in-flight item's execution for mutation; it is never
//! accessed concurrently.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One layer of key/value state.
pub type Layer = IndexMap<String, Value>;

/// The scope a key lives in, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Environment,
    Collection,
    Data,
}

/// Layered key/value store consulted and mutated during item execution.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScopeStore {
    #[serde(default)]
    globals: Layer,
    #[serde(default)]
    environment: Layer,
    #[serde(default)]
    collection: Layer,
    #[serde(default)]
    data: Layer,
}

impl ScopeStore {
    pub fn new(globals: Layer, environment: Layer) -> ScopeStore {
        ScopeStore {
            globals,
            environment,
            ..Default::default()
        }
    }

    /// Resolve a key through the scope chain, highest precedence first.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data
            .get(key)
            .or_else(|| self.collection.get(key))
            .or_else(|| self.environment.get(key))
            .or_else(|| self.globals.get(key))
    }

    /// Set a key in the given scope.
    pub fn set(&mut self, scope: ScopeKind, key: impl Into<String>, value: Value) {
        self.layer_mut(scope).insert(key.into(), value);
    }

    /// Remove a key from the given scope. Returns the removed value, if
    /// any. Removal is shift-preserving so export order stays stable.
    pub fn unset(&mut self, scope: ScopeKind, key: &str) -> Option<Value> {
        self.layer_mut(scope).shift_remove(key)
    }

    /// Replace the whole layer. Used at run start for the collection
    /// scope and between iterations for the data scope.
    pub fn load(&mut self, scope: ScopeKind, layer: Layer) {
        *self.layer_mut(scope) = layer;
    }

    /// Bind the data scope to the current iteration's row, or clear it
    /// when the iteration has no row.
    pub fn bind_data_row(&mut self, row: Option<&Layer>) {
        self.data = row.cloned().unwrap_or_default();
    }

    /// Snapshot one layer for export or summary embedding.
    pub fn snapshot(&self, scope: ScopeKind) -> Layer {
        self.layer(scope).clone()
    }

    fn layer(&self, scope: ScopeKind) -> &Layer {
        match scope {
            ScopeKind::Global => &self.globals,
            ScopeKind::Environment => &self.environment,
            ScopeKind::Collection => &self.collection,
            ScopeKind::Data => &self.data,
        }
    }

    fn layer_mut(&mut self, scope: ScopeKind) -> &mut Layer {
        match scope {
            ScopeKind::Global => &mut self.globals,
            ScopeKind::Environment => &mut self.environment,
            ScopeKind::Collection => &mut self.collection,
            ScopeKind::Data => &mut self.data,
        }
    }
}
