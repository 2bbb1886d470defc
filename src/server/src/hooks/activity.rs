use crate::engine::ForceDarkEngine;
use crate::hooks::adapter::{LaunchAdapter, RawLaunchEvent};
use log::trace;
use std::sync::Arc;

pub struct ActivityLaunchInterceptor {
    adapter: LaunchAdapter,
    engine: Arc<ForceDarkEngine>,
}

impl ActivityLaunchInterceptor {
    pub fn new(adapter: LaunchAdapter, engine: Arc<ForceDarkEngine>) -> Self {
        Self { adapter, engine }
    }

    /// Runs on the launching thread before the activity starts.
    pub fn on_launch(&self, raw: &RawLaunchEvent) {
        let Some(event) = self.adapter.resolve(raw) else {
            return;
        };

        trace!(
            "launch {} (history: {})",
            event.package, event.history_relaunch
        );

        self.engine.evaluate(&event.package);
    }
}
