//! RunningAppRegistry - 起動中インスタンスの所有者
//!
//! instanceId を主キーに、appId / processId / displayId の副インデックスを持つ。
//! 変更はすべてこのモジュールのメソッドを通し、インデックスを同時に更新する。
//! 前面ビュー（ForegroundState）も保持するが、書き換えるのは ForegroundReconciler だけ。

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::errors::AppMgrError;
use crate::domain::foreground::ForegroundState;
use crate::domain::ids::InstanceId;
use crate::domain::running_app::{PidSource, RunningApp, StatusChange};
use crate::domain::state::LifeStatus;

#[derive(Debug, Default)]
pub struct RunningAppRegistry {
    apps: HashMap<InstanceId, RunningApp>,
    /// 追加順（running list の並び）
    order: Vec<InstanceId>,
    by_app: HashMap<String, Vec<InstanceId>>,
    by_pid: HashMap<u32, InstanceId>,
    by_display: HashMap<u32, Vec<InstanceId>>,
    foreground: ForegroundState,
}

impl RunningAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// (appId, displayId) ごとに 1 インスタンスまで
    pub fn add(&mut self, app: RunningApp) -> Result<InstanceId, AppMgrError> {
        let instance_id = app.instance_id();
        if self.apps.contains_key(&instance_id) {
            return Err(AppMgrError::conflict(format!(
                "instance {instance_id} already registered"
            )));
        }
        if self
            .get_by_app_id(app.app_id(), Some(app.display_id()))
            .is_some()
        {
            return Err(AppMgrError::conflict(format!(
                "{} is already running on display {}",
                app.app_id(),
                app.display_id()
            )));
        }

        self.order.push(instance_id);
        self.by_app
            .entry(app.app_id().to_string())
            .or_default()
            .push(instance_id);
        self.by_display
            .entry(app.display_id())
            .or_default()
            .push(instance_id);
        if let Some(pid) = app.process_id() {
            self.by_pid.insert(pid, instance_id);
        }
        self.apps.insert(instance_id, app);
        Ok(instance_id)
    }

    pub fn remove(&mut self, instance_id: InstanceId) -> Option<RunningApp> {
        let app = self.apps.remove(&instance_id)?;
        self.order.retain(|id| *id != instance_id);
        remove_from_index(&mut self.by_app, app.app_id().to_string(), instance_id);
        remove_from_index(&mut self.by_display, app.display_id(), instance_id);
        if let Some(pid) = app.process_id()
            && self.by_pid.get(&pid) == Some(&instance_id)
        {
            self.by_pid.remove(&pid);
        }
        Some(app)
    }

    /// display を省略すると最初に起動したインスタンス
    pub fn get_by_app_id(&self, app_id: &str, display_id: Option<u32>) -> Option<&RunningApp> {
        let id = self.find_by_app_id(app_id, display_id)?;
        self.apps.get(&id)
    }

    pub fn find_by_app_id(&self, app_id: &str, display_id: Option<u32>) -> Option<InstanceId> {
        let ids = self.by_app.get(app_id)?;
        ids.iter()
            .copied()
            .find(|id| match display_id {
                None => true,
                Some(d) => self.apps.get(id).is_some_and(|app| app.display_id() == d),
            })
    }

    pub fn get_by_pid(&self, pid: u32) -> Option<&RunningApp> {
        let id = self.by_pid.get(&pid)?;
        self.apps.get(id)
    }

    pub fn get_by_instance_id(&self, instance_id: InstanceId) -> Option<&RunningApp> {
        self.apps.get(&instance_id)
    }

    pub fn get_mut(&mut self, instance_id: InstanceId) -> Option<&mut RunningApp> {
        self.apps.get_mut(&instance_id)
    }

    pub fn instances_of(&self, app_id: &str) -> Vec<InstanceId> {
        self.by_app.get(app_id).cloned().unwrap_or_default()
    }

    pub fn instances_on_display(&self, display_id: u32) -> Vec<InstanceId> {
        self.by_display.get(&display_id).cloned().unwrap_or_default()
    }

    /// 追加順
    pub fn iter(&self) -> impl Iterator<Item = &RunningApp> {
        self.order.iter().filter_map(|id| self.apps.get(id))
    }

    /// 状態遷移。インスタンスがなければ NotFound、グラフ外なら TransitionRejected
    pub fn set_life_status(
        &mut self,
        instance_id: InstanceId,
        next: LifeStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, AppMgrError> {
        let app = self
            .apps
            .get_mut(&instance_id)
            .ok_or_else(|| AppMgrError::not_found("instance", instance_id.to_string()))?;
        match app.set_life_status(next, reason, now) {
            Ok(change) => Ok(change),
            Err((from, to)) => Err(AppMgrError::TransitionRejected {
                app_id: app.app_id().to_string(),
                from,
                to,
            }),
        }
    }

    pub fn abort_to_closing(
        &mut self,
        instance_id: InstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Option<StatusChange> {
        self.apps.get_mut(&instance_id)?.abort_to_closing(reason, now)
    }

    pub fn leave_foreground(
        &mut self,
        instance_id: InstanceId,
        now: DateTime<Utc>,
    ) -> Option<StatusChange> {
        self.apps.get_mut(&instance_id)?.leave_foreground(now)
    }

    /// pid を更新し、pid インデックスを付け替える
    pub fn set_process_id(&mut self, instance_id: InstanceId, pid: u32, source: PidSource) -> bool {
        let Some(app) = self.apps.get_mut(&instance_id) else {
            return false;
        };
        let previous = app.process_id();
        if !app.set_process_id(pid, source) {
            return false;
        }
        if let Some(old) = previous
            && self.by_pid.get(&old) == Some(&instance_id)
        {
            self.by_pid.remove(&old);
        }
        self.by_pid.insert(pid, instance_id);
        true
    }

    pub fn foreground(&self) -> &ForegroundState {
        &self.foreground
    }

    pub fn get_foreground_app_ids(&self) -> Vec<String> {
        self.foreground.app_ids()
    }

    /// 前面ビューを丸ごと差し替える（ForegroundReconciler 専用）
    pub(crate) fn set_foreground(&mut self, state: ForegroundState) {
        self.foreground = state;
    }
}

fn remove_from_index<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, Vec<InstanceId>>,
    key: K,
    instance_id: InstanceId,
) {
    if let Some(ids) = index.get_mut(&key) {
        ids.retain(|id| *id != instance_id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::AppType;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn app(app_id: &str, display_id: u32) -> RunningApp {
        RunningApp::new(
            InstanceId::from_ulid(Ulid::new()),
            app_id,
            format!("{app_id}_default"),
            AppType::Native,
            display_id,
            now(),
        )
    }

    #[test]
    fn indices_follow_add_and_remove() {
        let mut registry = RunningAppRegistry::new();
        let id = registry.add(app("com.foo", 1)).unwrap();
        registry.set_process_id(id, 77, PidSource::Launcher);

        assert_eq!(registry.get_by_app_id("com.foo", None).unwrap().instance_id(), id);
        assert_eq!(registry.get_by_app_id("com.foo", Some(1)).unwrap().instance_id(), id);
        assert!(registry.get_by_app_id("com.foo", Some(0)).is_none());
        assert_eq!(registry.get_by_pid(77).unwrap().instance_id(), id);
        assert_eq!(registry.instances_on_display(1), vec![id]);

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.app_id(), "com.foo");
        assert!(registry.get_by_app_id("com.foo", None).is_none());
        assert!(registry.get_by_pid(77).is_none());
        assert!(registry.get_by_instance_id(id).is_none());
        assert!(registry.instances_on_display(1).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn one_instance_per_app_and_display() {
        let mut registry = RunningAppRegistry::new();
        registry.add(app("com.foo", 0)).unwrap();

        assert!(matches!(
            registry.add(app("com.foo", 0)),
            Err(AppMgrError::Conflict(_))
        ));
        // 別ディスプレイなら OK
        registry.add(app("com.foo", 1)).unwrap();
        assert_eq!(registry.instances_of("com.foo").len(), 2);
    }

    #[test]
    fn pid_index_is_repointed() {
        let mut registry = RunningAppRegistry::new();
        let id = registry.add(app("com.foo", 0)).unwrap();
        registry.set_process_id(id, 10, PidSource::Compositor);
        registry.set_process_id(id, 20, PidSource::Launcher);

        assert!(registry.get_by_pid(10).is_none());
        assert_eq!(registry.get_by_pid(20).unwrap().instance_id(), id);
        // compositor の値では上書きされない
        assert!(!registry.set_process_id(id, 30, PidSource::Compositor));
        assert!(registry.get_by_pid(30).is_none());
    }

    #[test]
    fn rejected_transition_is_reported() {
        let mut registry = RunningAppRegistry::new();
        let id = registry.add(app("com.foo", 0)).unwrap();

        let err = registry
            .set_life_status(id, LifeStatus::Paused, "bogus", now())
            .unwrap_err();
        assert!(matches!(err, AppMgrError::TransitionRejected { .. }));
        assert_eq!(
            registry.get_by_instance_id(id).unwrap().life_status(),
            LifeStatus::Stop
        );
    }

    #[test]
    fn unknown_instance_is_not_found() {
        let mut registry = RunningAppRegistry::new();
        let ghost = InstanceId::from_ulid(Ulid::new());
        assert!(matches!(
            registry.set_life_status(ghost, LifeStatus::Launching, "x", now()),
            Err(AppMgrError::NotFound { .. })
        ));
        assert!(registry.abort_to_closing(ghost, "x", now()).is_none());
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut registry = RunningAppRegistry::new();
        let ids: Vec<_> = ["c", "a", "b"]
            .into_iter()
            .map(|name| registry.add(app(name, 0)).unwrap())
            .collect();

        let seen: Vec<_> = registry.iter().map(RunningApp::instance_id).collect();
        assert_eq!(seen, ids);
    }
}
