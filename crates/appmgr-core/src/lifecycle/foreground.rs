//! ForegroundReconciler - compositor のスナップショットをインスタンス状態に反映する
//!
//! # 手順
//! 1. エントリを (appId, displayId) でインスタンスに解決。解決できないものはスキップ
//! 2. フルスクリーンのオーナーを決める（走査順で最後に一致したもの）
//! 3. 解決できたインスタンスを FOREGROUND に
//! 4. 前回いて今回いないアプリを BACKGROUND に（FOREGROUND / PAUSING のときだけ。
//!    PAUSING → BACKGROUND はこの経路にだけある辺）
//! 5. オーナーと info が前回と値で等しければ extraInfoOnly
//! 6. 前面ビューを 1 回で差し替える
//!
//! 同じスナップショットを 2 回流しても、2 回目は自己遷移（no-op）だけになる。

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::LifecycleConfig;
use crate::domain::foreground::{ForegroundSnapshot, ForegroundState};
use crate::domain::running_app::{PidSource, StatusChange};
use crate::domain::state::LifeStatus;
use crate::registry::RunningAppRegistry;

/// 1 回の反映結果
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundOutcome {
    /// 実際に適用された遷移（適用順）
    pub changes: Vec<StatusChange>,
    /// compositor 由来の pid を採用したインスタンスがあった
    pub pids_changed: bool,
    pub extra_info_only: bool,
    pub state: ForegroundState,
}

pub fn reconcile(
    running: &mut RunningAppRegistry,
    snapshot: &ForegroundSnapshot,
    config: &LifecycleConfig,
    now: DateTime<Utc>,
) -> ForegroundOutcome {
    let mut changes = Vec::new();
    let mut pids_changed = false;
    let mut next = ForegroundState::default();

    for (entry, raw) in snapshot.entries.iter().zip(&snapshot.raw) {
        let Some(instance_id) = running.find_by_app_id(&entry.app_id, Some(entry.display_id))
        else {
            debug!(
                app_id = %entry.app_id,
                display_id = entry.display_id,
                "foreground entry has no running instance"
            );
            continue;
        };

        if entry.owns_window_group() && config.is_fullscreen_type(&entry.window_type) {
            next.fullscreen_owner = Some(entry.app_id.clone());
        }
        if let Some(pid) = entry.process_id {
            pids_changed |= running.set_process_id(instance_id, pid, PidSource::Compositor);
        }
        next.targets.push((entry.app_id.clone(), entry.display_id));
        next.info.push(raw.clone());

        match running.set_life_status(instance_id, LifeStatus::Foreground, "foreground", now) {
            Ok(Some(change)) => changes.push(change),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "foreground transition ignored"),
        }
    }

    let previous = running.foreground().clone();
    for (app_id, display_id) in &previous.targets {
        if next.contains(app_id, *display_id) {
            continue;
        }
        let Some(app) = running.get_by_app_id(app_id, Some(*display_id)) else {
            continue;
        };
        let instance_id = app.instance_id();
        if let Some(change) = running.leave_foreground(instance_id, now) {
            changes.push(change);
        }
    }

    let extra_info_only =
        previous.fullscreen_owner == next.fullscreen_owner && previous.info == next.info;
    running.set_foreground(next.clone());

    ForegroundOutcome {
        changes,
        pids_changed,
        extra_info_only,
        state: next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::AppType;
    use crate::domain::ids::InstanceId;
    use crate::domain::running_app::RunningApp;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn launching(running: &mut RunningAppRegistry, app_id: &str) -> InstanceId {
        let id = running
            .add(RunningApp::new(
                InstanceId::from_ulid(Ulid::new()),
                app_id,
                format!("{app_id}_default"),
                AppType::Web,
                0,
                now(),
            ))
            .unwrap();
        running
            .set_life_status(id, LifeStatus::Launching, "launch", now())
            .unwrap();
        id
    }

    fn snapshot(value: Value) -> ForegroundSnapshot {
        ForegroundSnapshot::from_value(&value).unwrap()
    }

    fn status(running: &RunningAppRegistry, id: InstanceId) -> LifeStatus {
        running.get_by_instance_id(id).unwrap().life_status()
    }

    #[test]
    fn owner_leaves_and_goes_background() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        let a = launching(&mut running, "A");
        let b = launching(&mut running, "B");

        let first = reconcile(
            &mut running,
            &snapshot(json!([
                {"appId": "A", "windowGroupOwner": true, "windowType": "fullscreen"},
                {"appId": "B", "windowType": "overlay"},
            ])),
            &config,
            now(),
        );
        assert_eq!(first.state.fullscreen_owner.as_deref(), Some("A"));
        assert_eq!(first.changes.len(), 2);
        assert!(!first.extra_info_only);

        let second = reconcile(
            &mut running,
            &snapshot(json!([{"appId": "B", "windowType": "overlay"}])),
            &config,
            now(),
        );

        assert_eq!(status(&running, a), LifeStatus::Background);
        assert_eq!(status(&running, b), LifeStatus::Foreground);
        assert_eq!(second.state.fullscreen_owner, None);
        assert!(!second.extra_info_only);
        assert_eq!(second.changes.len(), 1);
        assert_eq!(second.changes[0].to, LifeStatus::Background);
        assert_eq!(running.get_foreground_app_ids(), vec!["B".to_string()]);
    }

    #[test]
    fn same_snapshot_twice_is_metadata_only() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        launching(&mut running, "A");
        let push = snapshot(json!([{"appId": "A", "windowType": "fullscreen", "processId": 9}]));

        let first = reconcile(&mut running, &push, &config, now());
        let stored = running.foreground().clone();
        let second = reconcile(&mut running, &push, &config, now());

        assert!(!first.extra_info_only);
        assert!(first.pids_changed);
        assert!(second.extra_info_only);
        assert!(second.changes.is_empty());
        assert!(!second.pids_changed);
        assert_eq!(running.foreground(), &stored);
    }

    #[test]
    fn unknown_entries_are_skipped() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        launching(&mut running, "A");

        let outcome = reconcile(
            &mut running,
            &snapshot(json!([
                {"appId": "ghost", "windowType": "fullscreen"},
                {"appId": "A", "windowType": "overlay"},
            ])),
            &config,
            now(),
        );

        assert_eq!(outcome.state.targets, vec![("A".to_string(), 0)]);
        assert_eq!(outcome.state.fullscreen_owner, None);
        assert_eq!(outcome.state.info.len(), 1);
    }

    #[test]
    fn last_fullscreen_match_wins() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        launching(&mut running, "A");
        launching(&mut running, "B");

        let outcome = reconcile(
            &mut running,
            &snapshot(json!([
                {"appId": "A", "windowType": "fullscreen"},
                {"appId": "B", "windowType": "_WEBOS_WINDOW_TYPE_CARD"},
            ])),
            &config,
            now(),
        );
        assert_eq!(outcome.state.owner_id(), "B");
    }

    #[test]
    fn grouped_window_needs_owner_flag() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        launching(&mut running, "A");

        let outcome = reconcile(
            &mut running,
            &snapshot(json!([{"appId": "A", "windowType": "fullscreen", "windowGroup": true}])),
            &config,
            now(),
        );
        assert_eq!(outcome.state.fullscreen_owner, None);
    }

    #[test]
    fn pausing_app_that_leaves_goes_background() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        let a = launching(&mut running, "A");
        reconcile(
            &mut running,
            &snapshot(json!([{"appId": "A", "windowType": "fullscreen"}])),
            &config,
            now(),
        );
        running
            .set_life_status(a, LifeStatus::Pausing, "pause", now())
            .unwrap();

        let outcome = reconcile(&mut running, &snapshot(json!([])), &config, now());
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].from, LifeStatus::Pausing);
        assert_eq!(status(&running, a), LifeStatus::Background);
    }

    #[test]
    fn paused_app_is_not_pushed_to_background() {
        let config = LifecycleConfig::default();
        let mut running = RunningAppRegistry::new();
        let a = launching(&mut running, "A");
        reconcile(
            &mut running,
            &snapshot(json!([{"appId": "A", "windowType": "fullscreen"}])),
            &config,
            now(),
        );
        for next in [LifeStatus::Pausing, LifeStatus::Paused] {
            running.set_life_status(a, next, "pause", now()).unwrap();
        }

        let outcome = reconcile(&mut running, &snapshot(json!([])), &config, now());
        assert!(outcome.changes.is_empty());
        assert_eq!(status(&running, a), LifeStatus::Paused);
    }
}
