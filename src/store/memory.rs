use crate::core::{RateError, RateResult, RateSnapshot};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// In-memory snapshot cache keyed by base currency.
///
/// Readers share the lock; each `set` takes it exclusively for a single
/// map insert. Snapshots are stored behind `Arc` and swapped whole, so a
/// reader holds either the old or the new value, never a mix.
#[derive(Debug, Default)]
pub struct RateStore {
    inner: RwLock<HashMap<String, Arc<RateSnapshot>>>,
}

impl RateStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, currency: &str, snapshot: impl Into<Arc<RateSnapshot>>) {
        let snapshot = snapshot.into();
        let mut data = self.inner.write();
        debug!(currency = %currency, rates = snapshot.rates.len(), "Store SET");
        data.insert(currency.to_string(), snapshot);
    }

    pub fn get(&self, currency: &str) -> RateResult<Arc<RateSnapshot>> {
        let data = self.inner.read();
        data.get(currency)
            .cloned()
            .ok_or_else(|| RateError::not_found(currency))
    }

    /// Copy of the current contents. Later writes are not visible through it.
    pub fn get_all(&self) -> BTreeMap<String, Arc<RateSnapshot>> {
        let data = self.inner.read();
        data.iter()
            .map(|(code, snapshot)| (code.clone(), Arc::clone(snapshot)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
