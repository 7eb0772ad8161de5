//! TracingEventSink - ライフサイクルイベントを tracing に流す

use tracing::info;

use crate::domain::events::LifecycleEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::LifeStatusChanged {
                instance_id,
                app_id,
                from,
                to,
                reason,
                ..
            } => info!(%instance_id, %app_id, %from, %to, %reason, "life status changed"),
            LifecycleEvent::ForegroundChanged {
                fullscreen_owner,
                app_ids,
                extra_info_only,
                ..
            } => info!(
                owner = fullscreen_owner.as_deref().unwrap_or(""),
                ?app_ids,
                extra_info_only,
                "foreground changed"
            ),
            other => info!(event = other.name(), "lifecycle event"),
        }
    }
}
