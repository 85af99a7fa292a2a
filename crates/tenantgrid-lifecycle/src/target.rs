//! Target controller: publishes each target's remaining capacity.

use tracing::debug;

use tenantgrid_state::{ObjectRef, StateStore};

use crate::capacity::Capacity;
use crate::deployment::LifecycleConfig;
use crate::error::LifecycleResult;

#[derive(Clone)]
pub struct TargetController {
    capacity: Capacity,
}

impl TargetController {
    pub fn new(store: StateStore, config: LifecycleConfig) -> Self {
        Self {
            capacity: Capacity::new(store, config.conflict_retries),
        }
    }

    /// Returns whether the target's status was rewritten.
    pub fn reconcile(&self, key: &ObjectRef) -> LifecycleResult<bool> {
        let written = self.capacity.publish(key)?;
        if !written {
            debug!(target = %key, "target capacity up to date");
        }
        Ok(written)
    }
}
