//! The live template cache.
//!
//! Maps endpoint keys to compiled templates behind a single reader/writer
//! lock. All writes go through [`TemplateCache::store`] (or `retain` when
//! pruning); reads go through [`TemplateCache::load`] and
//! [`TemplateCache::snapshot`]. The backing map is never handed out.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::template::{Template, TemplateDefinition};

type Entries = Option<HashMap<String, Arc<Template>>>;

/// What a [`TemplateCache::store`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// No entry existed for the key.
    Inserted,
    /// An entry existed and differed from the candidate.
    Replaced,
    /// An identical entry was already stored.
    Unchanged,
}

impl StoreOutcome {
    /// Whether the cache contents changed.
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Concurrent-safe endpoint -> template mapping for one agent.
#[derive(Debug)]
pub struct TemplateCache {
    /// Identifies the owning project.
    agent_name: String,

    /// `None` until the first snapshot initializes it.
    entries: RwLock<Entries>,

    /// Bumped on every effective change.
    revision: AtomicU64,
}

impl TemplateCache {
    /// Create an empty, uninitialized cache.
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            entries: RwLock::new(None),
            revision: AtomicU64::new(0),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Number of effective changes applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Whether the backing map has been allocated.
    pub fn is_initialized(&self) -> bool {
        self.read().is_some()
    }

    /// Allocate the backing map if it does not exist yet.
    pub fn initialize(&self, capacity: usize) {
        let mut entries = self.write();
        if entries.is_none() {
            debug!(capacity, "Initializing template cache");
            *entries = Some(HashMap::with_capacity(capacity));
        }
    }

    /// Store `template` under `endpoint` unless an equal one is already there.
    ///
    /// The key wins over the name the template was compiled under: the stored
    /// template is rebound to `endpoint`, so lookups, the dump and
    /// missing-argument errors all report the key.
    pub fn store(&self, endpoint: &str, template: Template) -> StoreOutcome {
        let template = template.with_endpoint(endpoint);
        let mut guard = self.write();
        let entries = guard.get_or_insert_with(HashMap::new);

        let outcome = match entries.get(endpoint) {
            None => {
                info!(endpoint, "Adding template");
                StoreOutcome::Inserted
            }
            Some(existing) if existing.equals(&template) => {
                debug!(endpoint, "Template unchanged");
                return StoreOutcome::Unchanged;
            }
            Some(_) => {
                info!(endpoint, "New template for endpoint");
                StoreOutcome::Replaced
            }
        };

        entries.insert(endpoint.to_string(), Arc::new(template));
        self.revision.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Look up the template for `endpoint`.
    pub fn load(&self, endpoint: &str) -> Option<Arc<Template>> {
        self.read()
            .as_ref()
            .and_then(|entries| entries.get(endpoint).cloned())
    }

    /// Drop every entry whose key is not in `keep`; returns how many were removed.
    pub fn retain(&self, keep: &HashSet<String>) -> usize {
        let mut guard = self.write();
        let Some(entries) = guard.as_mut() else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|endpoint, _| {
            let kept = keep.contains(endpoint);
            if !kept {
                info!(endpoint = %endpoint, "Removing template");
            }
            kept
        });

        let removed = before - entries.len();
        if removed > 0 {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Copy out every definition, keyed by endpoint.
    pub fn snapshot(&self) -> BTreeMap<String, TemplateDefinition> {
        let entries: Vec<(String, Arc<Template>)> = match self.read().as_ref() {
            Some(entries) => entries
                .iter()
                .map(|(endpoint, t)| (endpoint.clone(), Arc::clone(t)))
                .collect(),
            None => return BTreeMap::new(),
        };

        entries
            .into_iter()
            .map(|(endpoint, t)| (endpoint, t.definition().clone()))
            .collect()
    }

    /// Endpoint keys currently stored, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .read()
            .as_ref()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
