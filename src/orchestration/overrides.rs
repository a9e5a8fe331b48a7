//! Per-deal local overrides for one referral's view.

use crate::domain::{AgentAttribution, Deal, DealId, DealStatus, TerminatedReason};
use std::collections::HashMap;

/// Locally applied values for one field, keyed by deal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideMap<T> {
    values: HashMap<DealId, T>,
}

impl<T> Default for OverrideMap<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T: Clone + PartialEq> OverrideMap<T> {
    pub fn get(&self, id: &DealId) -> Option<&T> {
        self.values.get(id)
    }

    /// Set a value, returning what was there before.
    pub fn set(&mut self, id: DealId, value: T) -> Option<T> {
        self.values.insert(id, value)
    }

    /// Undo a [`Self::set`] of `applied`, restoring `previous`.
    ///
    /// Does nothing if the entry no longer holds `applied`: a later change
    /// or a purge owns the slot now. Returns whether a restore happened.
    pub fn restore(&mut self, id: &DealId, applied: &T, previous: Option<T>) -> bool {
        if self.values.get(id) != Some(applied) {
            return false;
        }
        match previous {
            Some(value) => {
                self.values.insert(id.clone(), value);
            }
            None => {
                self.values.remove(id);
            }
        }
        true
    }

    /// Drop `applied` once the store has confirmed it. A newer value set
    /// since then stays. Returns whether the entry was dropped.
    pub fn settle(&mut self, id: &DealId, applied: &T) -> bool {
        if self.values.get(id) != Some(applied) {
            return false;
        }
        self.values.remove(id);
        true
    }

    pub fn remove(&mut self, id: &DealId) -> Option<T> {
        self.values.remove(id)
    }

    pub fn retain_ids(&mut self, keep: impl Fn(&DealId) -> bool) {
        self.values.retain(|id, _| keep(id));
    }

    pub fn as_map(&self) -> &HashMap<DealId, T> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Every override kept for a referral's deals.
///
/// Deleting a deal purges its id from all maps at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideStore {
    pub status: OverrideMap<DealStatus>,
    /// `Some(None)` means the reason was cleared locally.
    pub terminated_reason: OverrideMap<Option<TerminatedReason>>,
    pub agent_attribution: OverrideMap<AgentAttribution>,
    pub used_afc: OverrideMap<bool>,
    pub expanded: OverrideMap<bool>,
}

impl OverrideStore {
    /// Copy of `deal` with every override for it applied.
    pub fn apply(&self, deal: &Deal) -> Deal {
        let mut view = deal.clone();
        let Some(id) = deal.id.as_ref() else {
            return view;
        };
        if let Some(status) = self.status.get(id) {
            view.status = *status;
        }
        if let Some(reason) = self.terminated_reason.get(id) {
            view.terminated_reason = *reason;
        }
        if let Some(attribution) = self.agent_attribution.get(id) {
            view.agent_attribution = *attribution;
        }
        if let Some(used_afc) = self.used_afc.get(id) {
            view.used_afc = *used_afc;
        }
        view
    }

    /// Remove every override for a deal.
    pub fn purge(&mut self, id: &DealId) {
        self.status.remove(id);
        self.terminated_reason.remove(id);
        self.agent_attribution.remove(id);
        self.used_afc.remove(id);
        self.expanded.remove(id);
    }

    /// Drop overrides for ids not accepted by `keep`.
    pub fn retain_ids(&mut self, keep: impl Fn(&DealId) -> bool) {
        self.status.retain_ids(&keep);
        self.terminated_reason.retain_ids(&keep);
        self.agent_attribution.retain_ids(&keep);
        self.used_afc.retain_ids(&keep);
        self.expanded.retain_ids(&keep);
    }

    /// Drop persisted-field overrides for deals with no write in flight,
    /// so the view falls back to the stored records. Expansion is local
    /// state and is kept.
    pub fn settle_idle(&mut self, in_flight: impl Fn(&DealId) -> bool) {
        self.status.retain_ids(&in_flight);
        self.terminated_reason.retain_ids(&in_flight);
        self.agent_attribution.retain_ids(&in_flight);
        self.used_afc.retain_ids(&in_flight);
    }

    pub fn contains(&self, id: &DealId) -> bool {
        self.status.get(id).is_some()
            || self.terminated_reason.get(id).is_some()
            || self.agent_attribution.get(id).is_some()
            || self.used_afc.get(id).is_some()
            || self.expanded.get(id).is_some()
    }
}
