//! LunaTaskQueue - 返信待ちリクエストの相関キュー
//!
//! # 契約
//! - `add` は常に成功する
//! - 検索はすべて線形走査。見つからなければ None
//! - `remove_after_reply` は返信とキューからの削除を同時に行う。2 回目は false
//! - トークンのないタスクは `get_by_token` ではマッチしない

use crate::domain::app::AppType;
use crate::domain::errors::AppMgrError;
use crate::domain::ids::{BusToken, InstanceId, TaskUuid};
use crate::domain::task::LunaTask;

/// バルク削除の対象となるサブシステム
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// あるランタイム（native / web / qml booster）の launcher が落ちた
    Runtime(AppType),
    /// compositor が落ちた
    Compositor,
}

impl Subsystem {
    /// このサブシステムの停止で打ち切るべきタスクか
    pub fn owns(&self, task: &LunaTask) -> bool {
        match self {
            Subsystem::Runtime(runtime) => task.app_type() == Some(*runtime),
            Subsystem::Compositor => task.kind() == "/launch",
        }
    }
}

#[derive(Debug, Default)]
pub struct LunaTaskQueue {
    tasks: Vec<LunaTask>,
}

impl LunaTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn add(&mut self, task: LunaTask) -> TaskUuid {
        let uuid = task.uuid();
        self.tasks.push(task);
        uuid
    }

    pub fn get(&self, uuid: TaskUuid) -> Option<&LunaTask> {
        self.tasks.iter().find(|t| t.uuid() == uuid)
    }

    pub fn get_mut(&mut self, uuid: TaskUuid) -> Option<&mut LunaTask> {
        self.tasks.iter_mut().find(|t| t.uuid() == uuid)
    }

    pub fn get_by_token(&self, token: BusToken) -> Option<TaskUuid> {
        self.tasks
            .iter()
            .find(|t| t.token() == Some(token))
            .map(LunaTask::uuid)
    }

    pub fn get_by_app_id(&self, app_id: &str) -> Option<TaskUuid> {
        self.tasks
            .iter()
            .find(|t| t.app_id() == Some(app_id))
            .map(LunaTask::uuid)
    }

    pub fn get_by_instance_id(&self, instance_id: InstanceId) -> Option<TaskUuid> {
        self.tasks
            .iter()
            .find(|t| t.instance_id() == Some(instance_id))
            .map(LunaTask::uuid)
    }

    pub fn get_by_kind_and_app_id(&self, kind: &str, app_id: &str) -> Option<TaskUuid> {
        self.tasks
            .iter()
            .find(|t| t.app_id() == Some(app_id) && t.kind() == kind)
            .map(LunaTask::uuid)
    }

    /// 条件に合うタスクの uuid（キューの順序で）
    pub fn find_all(&self, predicate: impl Fn(&LunaTask) -> bool) -> Vec<TaskUuid> {
        self.tasks
            .iter()
            .filter(|t| predicate(t))
            .map(LunaTask::uuid)
            .collect()
    }

    /// 返信してから削除する。キューになければ false（返信もしない）
    pub fn remove_after_reply(&mut self, uuid: TaskUuid) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.uuid() == uuid) else {
            return false;
        };
        let task = self.tasks.remove(index);
        let uuid = task.uuid();
        if !task.send_reply() {
            tracing::debug!(task = %uuid, "requester went away before the reply");
        }
        true
    }

    /// エラーを付けて返信・削除する
    pub fn fail(&mut self, uuid: TaskUuid, err: &AppMgrError) -> bool {
        let Some(task) = self.get_mut(uuid) else {
            return false;
        };
        task.fail(err);
        self.remove_after_reply(uuid)
    }

    /// 条件に合うタスクをすべてエラー返信して削除する。件数を返す
    pub fn fail_where(
        &mut self,
        predicate: impl Fn(&LunaTask) -> bool,
        err: &AppMgrError,
    ) -> usize {
        let targets = self.find_all(predicate);
        for uuid in &targets {
            self.fail(*uuid, err);
        }
        targets.len()
    }

    /// サブシステム停止時のバルク削除
    pub fn remove_by_subsystem(&mut self, subsystem: Subsystem, err: &AppMgrError) -> usize {
        self.fail_where(|t| subsystem.owns(t), err)
    }

    /// 残っているタスクをすべて取り出す（シャットダウン用）
    pub fn drain(&mut self) -> Vec<LunaTask> {
        std::mem::take(&mut self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::{RequestEnvelope, Responder};
    use serde_json::{Value, json};
    use tokio::sync::mpsc::UnboundedReceiver;
    use ulid::Ulid;

    fn task(method: &str, payload: Value) -> (LunaTask, UnboundedReceiver<Value>) {
        let (responder, rx) = Responder::channel();
        let request = RequestEnvelope::new("/", method, payload);
        (
            LunaTask::new(TaskUuid::from_ulid(Ulid::new()), request, responder),
            rx,
        )
    }

    #[test]
    fn remove_after_reply_succeeds_once() {
        let mut queue = LunaTaskQueue::new();
        let (t, mut rx) = task("launch", json!({"id": "com.foo"}));
        let uuid = queue.add(t);

        assert!(queue.remove_after_reply(uuid));
        assert!(!queue.remove_after_reply(uuid));

        assert_eq!(rx.try_recv().unwrap()["returnValue"], true);
        assert!(rx.try_recv().is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn token_lookup_needs_a_token() {
        let mut queue = LunaTaskQueue::new();
        let (t, _rx) = task("launch", json!({"id": "com.foo"}));
        let uuid = queue.add(t);
        let mut tokens = crate::domain::ids::TokenAllocator::new();
        let token = tokens.next_token();

        assert_eq!(queue.get_by_token(token), None);
        // トークンがなくても appId + kind では引ける
        assert_eq!(queue.get_by_kind_and_app_id("/launch", "com.foo"), Some(uuid));

        queue.get_mut(uuid).unwrap().set_token(token);
        assert_eq!(queue.get_by_token(token), Some(uuid));

        // トークンは付け替えられる
        let next = tokens.next_token();
        queue.get_mut(uuid).unwrap().set_token(next);
        assert_eq!(queue.get_by_token(token), None);
        assert_eq!(queue.get_by_token(next), Some(uuid));
    }

    #[test]
    fn lookups_by_app_and_instance() {
        let mut queue = LunaTaskQueue::new();
        let (a, _ra) = task("close", json!({"id": "com.a"}));
        let (b, _rb) = task("launch", json!({"id": "com.b"}));
        let a = queue.add(a);
        let b = queue.add(b);
        let instance = InstanceId::from_ulid(Ulid::new());
        queue.get_mut(b).unwrap().set_instance_id(instance);

        assert_eq!(queue.get_by_app_id("com.a"), Some(a));
        assert_eq!(queue.get_by_instance_id(instance), Some(b));
        assert_eq!(queue.get_by_kind_and_app_id("/launch", "com.a"), None);
        assert_eq!(queue.get_by_app_id("com.c"), None);
    }

    #[test]
    fn failing_a_task_sends_error_reply() {
        let mut queue = LunaTaskQueue::new();
        let (t, mut rx) = task("launch", json!({"id": "com.foo"}));
        let uuid = queue.add(t);

        assert!(queue.fail(uuid, &AppMgrError::Cancelled("closed".into())));

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply["returnValue"], false);
        assert_eq!(reply["errorText"], "request cancelled: closed");
    }

    #[test]
    fn runtime_teardown_only_takes_matching_tasks() {
        let mut queue = LunaTaskQueue::new();
        let (web, mut web_rx) = task("launch", json!({"id": "com.web"}));
        let (native, mut native_rx) = task("launch", json!({"id": "com.native"}));
        let web = queue.add(web);
        let native = queue.add(native);
        queue.get_mut(web).unwrap().set_app_type(AppType::Web);
        queue.get_mut(native).unwrap().set_app_type(AppType::Native);

        let err = AppMgrError::Collaborator {
            runtime: "web".into(),
            message: "disconnected".into(),
        };
        let removed = queue.remove_by_subsystem(Subsystem::Runtime(AppType::Web), &err);

        assert_eq!(removed, 1);
        assert_eq!(web_rx.try_recv().unwrap()["returnValue"], false);
        assert!(native_rx.try_recv().is_err());
        assert!(queue.get(native).is_some());
    }

    #[test]
    fn compositor_teardown_takes_every_launch() {
        let mut queue = LunaTaskQueue::new();
        let (l1, _r1) = task("launch", json!({"id": "a"}));
        let (l2, _r2) = task("launch", json!({"id": "b"}));
        let (c, _r3) = task("close", json!({"id": "a"}));
        queue.add(l1);
        queue.add(l2);
        let close = queue.add(c);

        let err = AppMgrError::Collaborator {
            runtime: "compositor".into(),
            message: "gone".into(),
        };
        assert_eq!(queue.remove_by_subsystem(Subsystem::Compositor, &err), 2);
        assert_eq!(queue.len(), 1);
        assert!(queue.get(close).is_some());
    }
}
