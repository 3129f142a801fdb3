//! Recent activity and "resume where you left off"
//!
//! Navigation history lives in an injected [`SessionStore`] so the core
//! never touches ambient state. Corrupt or foreign values in the store
//! read as empty history rather than failing.

use crate::hierarchy::Hierarchy;
use crate::scope::{resolve_or_root, Scope, ScopeRef};
use ctrack_common::{SessionStore, TrackerResult};
use std::sync::Arc;

/// Store key for the most-recent-first visit list
pub const RECENT_KEY: &str = "recent_scopes";
/// Store key for the last visited scope
pub const LAST_SCOPE_KEY: &str = "last_scope";
/// Default number of remembered scopes
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Recently visited scopes
pub struct RecentActivity {
    store: Arc<dyn SessionStore>,
    limit: usize,
}

impl RecentActivity {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_limit(store, DEFAULT_RECENT_LIMIT)
    }

    pub fn with_limit(store: Arc<dyn SessionStore>, limit: usize) -> Self {
        Self { store, limit: limit.max(1) }
    }

    /// Record a visit
    ///
    /// Node scopes move to the front of the recent list, replacing any
    /// earlier entry for the same (kind, id). Every visit, including the
    /// root view, becomes the last visited scope.
    pub fn visit(&self, scope: &Scope) -> TrackerResult<()> {
        self.store.set(LAST_SCOPE_KEY, serde_json::to_value(scope)?)?;

        if let Scope::Node(target) = scope {
            let mut recent = self.recent();
            recent.retain(|r| !r.same_node(target));
            recent.insert(0, target.clone());
            recent.truncate(self.limit);
            self.store.set(RECENT_KEY, serde_json::to_value(&recent)?)?;
        }
        Ok(())
    }

    /// Most recent first
    pub fn recent(&self) -> Vec<ScopeRef> {
        self.store
            .get(RECENT_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn last_scope(&self) -> Option<Scope> {
        self.store
            .get(LAST_SCOPE_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Last visited scope if it still resolves, else the root view
    pub fn resume(&self, hierarchy: &Hierarchy) -> Scope {
        match self.last_scope() {
            Some(scope) => resolve_or_root(&scope, hierarchy),
            None => Scope::Root,
        }
    }

    /// Drop entries that no longer resolve against `hierarchy`
    pub fn prune(&self, hierarchy: &Hierarchy) -> TrackerResult<usize> {
        let recent = self.recent();
        let before = recent.len();
        let kept: Vec<ScopeRef> = recent
            .into_iter()
            .filter(|r| !resolve_or_root(&Scope::Node(r.clone()), hierarchy).is_root())
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale recent scopes");
            self.store.set(RECENT_KEY, serde_json::to_value(&kept)?)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> TrackerResult<()> {
        self.store.remove(RECENT_KEY)?;
        self.store.remove(LAST_SCOPE_KEY)
    }
}
