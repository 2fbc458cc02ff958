//! Last accepted raw value per domain.

use crate::types::Domain;
use serde_json::Value;
use std::collections::HashMap;

/// Raw domain values that were last reconciled successfully. A domain whose
/// incoming raw value deep-equals its cached one is not reconciled again.
#[derive(Clone, Debug, Default)]
pub struct RawFieldCache {
    values: HashMap<Domain, Value>,
}

impl RawFieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: Domain) -> Option<&Value> {
        self.values.get(&domain)
    }

    pub fn is_unchanged(&self, domain: Domain, raw: &Value) -> bool {
        self.values.get(&domain) == Some(raw)
    }

    pub fn insert(&mut self, domain: Domain, raw: Value) {
        self.values.insert(domain, raw);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
