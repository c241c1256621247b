use super::job::{StatusChange, StatusKind, UnitId, UnitStatus, WorkUnit};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Canonical list of work units; the single source of truth for their status.
///
/// Units stay in submission order. Lookups go through an id index and status
/// counts are kept up to date on every change.
pub struct Registry {
    units: Vec<WorkUnit>,
    index: HashMap<UnitId, usize>,
    counts: HashMap<StatusKind, usize>,
    changes: broadcast::Sender<StatusChange>,
}

impl Registry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            units: Vec::new(),
            index: HashMap::new(),
            counts: HashMap::new(),
            changes,
        }
    }

    /// Receive every accepted status change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    /// Append units, keeping submission order. An id already present is skipped.
    pub fn add(&mut self, units: impl IntoIterator<Item = WorkUnit>) {
        for unit in units {
            if self.index.contains_key(&unit.id) {
                warn!(id = %unit.id, "Ignoring duplicate unit");
                continue;
            }
            self.index.insert(unit.id.clone(), self.units.len());
            *self.counts.entry(unit.kind()).or_default() += 1;
            self.notify(&unit);
            self.units.push(unit);
        }
    }

    pub fn get(&self, id: &UnitId) -> Option<&WorkUnit> {
        self.index.get(id).map(|&i| &self.units[i])
    }

    /// Move a unit to a new status. Unknown ids and transitions outside the
    /// lifecycle are ignored; returns whether the status changed.
    pub fn update_status(&mut self, id: &UnitId, status: UnitStatus) -> bool {
        let Some(&i) = self.index.get(id) else {
            debug!(%id, "Ignoring status update for unknown unit");
            return false;
        };
        let unit = &mut self.units[i];
        let from = unit.kind();
        let to = status.kind();
        if !unit.status.can_transition_to(&status) {
            warn!(%id, %from, %to, "Rejected invalid status transition");
            return false;
        }
        unit.status = status;

        if let Some(count) = self.counts.get_mut(&from) {
            *count = count.saturating_sub(1);
        }
        *self.counts.entry(to).or_default() += 1;

        let change = StatusChange {
            id: unit.id.clone(),
            name: unit.name.clone(),
            status: to,
        };
        // No subscribers is fine
        let _ = self.changes.send(change);
        true
    }

    pub fn remove(&mut self, id: &UnitId) -> Option<WorkUnit> {
        let i = self.index.remove(id)?;
        let unit = self.units.remove(i);
        for (pos, later) in self.units.iter().enumerate().skip(i) {
            self.index.insert(later.id.clone(), pos);
        }
        if let Some(count) = self.counts.get_mut(&unit.kind()) {
            *count = count.saturating_sub(1);
        }
        Some(unit)
    }

    /// Ids with the given status, in submission order
    pub fn list_by_status(&self, kind: StatusKind) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.kind() == kind)
            .map(|u| u.id.clone())
            .collect()
    }

    pub fn count_by_status(&self, kind: StatusKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.index.clear();
        self.counts.clear();
    }

    fn notify(&self, unit: &WorkUnit) {
        let _ = self.changes.send(StatusChange {
            id: unit.id.clone(),
            name: unit.name.clone(),
            status: unit.kind(),
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
