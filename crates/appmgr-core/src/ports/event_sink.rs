//! EventSink port - ライフサイクルイベントの配送先
//!
//! - `broadcast::Sender<LifecycleEvent>`: handle から購読できる標準の配送先
//! - `TracingEventSink`（impls）: tracing にイベントを流す

use tokio::sync::broadcast;

use crate::domain::events::LifecycleEvent;

/// イベントループから同期的に呼ばれる。ブロックしてはいけない
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

impl EventSink for broadcast::Sender<LifecycleEvent> {
    fn emit(&self, event: &LifecycleEvent) {
        // 受信者がいないときの Err は無視してよい
        let _ = self.send(event.clone());
    }
}
