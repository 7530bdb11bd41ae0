use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::run::RunId;
use crate::models::OwnerId;

/// Owners with a run currently generating or rendering.
#[derive(Clone, Default)]
pub struct InFlightRuns {
    owners: Arc<DashMap<OwnerId, RunId>>,
}

impl InFlightRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `owner` for `run_id`. Fails with the id of the run already holding it.
    pub fn acquire(&self, owner: &OwnerId, run_id: RunId) -> Result<RunGuard, RunId> {
        match self.owners.entry(owner.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(run_id);
                Ok(RunGuard {
                    owner: owner.clone(),
                    owners: Arc::clone(&self.owners),
                })
            }
            Entry::Occupied(occupied) => Err(*occupied.get()),
        }
    }
}

/// Releases the owner when dropped, including when the run task panics.
pub struct RunGuard {
    owner: OwnerId,
    owners: Arc<DashMap<OwnerId, RunId>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.owners.remove(&self.owner);
    }
}
