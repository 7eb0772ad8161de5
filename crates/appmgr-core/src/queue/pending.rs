//! PendingTasks - 依存先の準備ができるまで保留するリクエスト
//!
//! 保留理由（`Readiness`）ごとにリストを持つ。条件が解消したら到着順に
//! すべて取り出し、通常のディスパッチ経路で再実行する。

use std::collections::HashMap;

use crate::domain::task::LunaTask;

/// 保留の理由となる未準備の依存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// アプリカタログの初回スキャンが終わっていない
    CatalogScan,
}

#[derive(Debug, Default)]
pub struct PendingTasks {
    lists: HashMap<Readiness, Vec<LunaTask>>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, condition: Readiness, task: LunaTask) {
        tracing::debug!(task = %task.uuid(), kind = %task.kind(), ?condition, "deferring request");
        self.lists.entry(condition).or_default().push(task);
    }

    /// 条件が解消した。到着順に取り出してリストを空にする
    pub fn release(&mut self, condition: Readiness) -> Vec<LunaTask> {
        self.lists.remove(&condition).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain_all(&mut self) -> Vec<LunaTask> {
        self.lists.drain().flat_map(|(_, tasks)| tasks).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::{RequestEnvelope, Responder};
    use crate::domain::ids::TaskUuid;
    use serde_json::json;
    use ulid::Ulid;

    fn task(method: &str) -> LunaTask {
        let (responder, _rx) = Responder::channel();
        LunaTask::new(
            TaskUuid::from_ulid(Ulid::new()),
            RequestEnvelope::new("/", method, json!({})),
            responder,
        )
    }

    #[test]
    fn release_keeps_arrival_order_and_clears() {
        let mut pending = PendingTasks::new();
        for method in ["listLaunchPoints", "launch", "listApps"] {
            pending.defer(Readiness::CatalogScan, task(method));
        }
        assert_eq!(pending.len(), 3);

        let released: Vec<_> = pending
            .release(Readiness::CatalogScan)
            .into_iter()
            .map(|t| t.method().to_string())
            .collect();

        assert_eq!(released, vec!["listLaunchPoints", "launch", "listApps"]);
        assert!(pending.is_empty());
        assert!(pending.release(Readiness::CatalogScan).is_empty());
    }
}
