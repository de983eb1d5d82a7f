use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Display gate owned by the operator.
///
/// "Start" and "stop" only decide whether a dashboard should show live data.
/// The listener keeps accepting and storing readings either way.
#[derive(Debug, Default)]
pub struct ControlSurface {
    active: AtomicBool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub active: bool,
}

impl ControlSurface {
    pub fn new(active: bool) -> Self {
        Self { active: AtomicBool::new(active) }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) -> ControlState {
        self.active.store(active, Ordering::Release);
        ControlState { active }
    }

    pub fn state(&self) -> ControlState {
        ControlState { active: self.is_active() }
    }
}
