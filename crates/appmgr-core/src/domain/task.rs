//! LunaTask - 返信待ちのクライアントリクエスト
//!
//! # 返信の契約
//! - 返信はちょうど 1 回（キューからの削除と同時に行う）
//! - エラーを設定すると `returnValue` は false に倒れ、成功には戻らない
//! - `returnValue=false` のときは `errorCode` / `errorText` が必ず付く

use std::time::Instant;

use serde_json::{Map, Value};

use crate::domain::app::AppType;
use crate::domain::envelope::{RequestEnvelope, Responder};
use crate::domain::errors::AppMgrError;
use crate::domain::ids::{BusToken, InstanceId, TaskUuid};

/// 主処理のあとに続ける 1 ステップ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// pause 完了後に close へ進む
    Close,
}

#[derive(Debug)]
pub struct LunaTask {
    uuid: TaskUuid,
    request: RequestEnvelope,
    responder: Responder,
    token: Option<BusToken>,
    response: Map<String, Value>,
    error: Option<(i32, String)>,
    reason: String,
    next_step: Option<NextStep>,
    instance_id: Option<InstanceId>,
    app_type: Option<AppType>,
    created_at: Instant,
}

impl LunaTask {
    pub fn new(uuid: TaskUuid, request: RequestEnvelope, responder: Responder) -> Self {
        Self {
            uuid,
            request,
            responder,
            token: None,
            response: Map::new(),
            error: None,
            reason: String::new(),
            next_step: None,
            instance_id: None,
            app_type: None,
            created_at: Instant::now(),
        }
    }

    pub fn uuid(&self) -> TaskUuid {
        self.uuid
    }

    pub fn request(&self) -> &RequestEnvelope {
        &self.request
    }

    pub fn kind(&self) -> String {
        self.request.kind()
    }

    pub fn method(&self) -> &str {
        self.request.method()
    }

    pub fn payload(&self) -> &Value {
        self.request.payload()
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn token(&self) -> Option<BusToken> {
        self.token
    }

    /// 非同期呼び出しのたびに最新のトークンを付け替える
    pub fn set_token(&mut self, token: BusToken) {
        self.token = Some(token);
    }

    /// payload の "id"
    pub fn app_id(&self) -> Option<&str> {
        self.request.str_field("id")
    }

    pub fn launch_point_id(&self) -> Option<&str> {
        self.request.str_field("launchPointId")
    }

    /// 解決済みの対象インスタンス。未解決なら payload の "instanceId"
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
            .or_else(|| self.request.str_field("instanceId").and_then(InstanceId::parse))
    }

    pub fn set_instance_id(&mut self, instance_id: InstanceId) {
        self.instance_id = Some(instance_id);
    }

    pub fn display_id(&self) -> u32 {
        self.payload()
            .get("displayId")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(0)
    }

    pub fn app_type(&self) -> Option<AppType> {
        self.app_type
    }

    pub fn set_app_type(&mut self, app_type: AppType) {
        self.app_type = Some(app_type);
    }

    pub fn next_step(&self) -> Option<NextStep> {
        self.next_step
    }

    pub fn set_next_step(&mut self, step: Option<NextStep>) {
        self.next_step = step;
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_subscription(&self) -> bool {
        self.request.is_subscription()
    }

    /// 返信に載せるフィールドを追加する
    pub fn set_response(&mut self, key: &str, value: Value) {
        self.response.insert(key.to_string(), value);
    }

    /// オブジェクトのフィールドをまとめて返信に載せる
    pub fn merge_response(&mut self, value: Value) {
        if let Value::Object(map) = value {
            self.response.extend(map);
        }
    }

    pub fn set_error(&mut self, code: i32, text: impl Into<String>) {
        let text = text.into();
        let text = if text.is_empty() {
            "unknown error".to_string()
        } else {
            text
        };
        self.error = Some((code, text));
    }

    pub fn fail(&mut self, err: &AppMgrError) {
        self.set_error(err.code(), err.to_string());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// 返信 payload を組み立てる。
    /// errorCode / errorText は、response に同名キーがなければ staged エラーから補う
    pub fn build_reply(&self) -> Value {
        let mut reply = self.response.clone();
        let mut failed = matches!(reply.get("returnValue"), Some(Value::Bool(false)));
        if let Some((code, text)) = &self.error {
            failed = true;
            reply.entry("errorCode").or_insert_with(|| Value::from(*code));
            reply
                .entry("errorText")
                .or_insert_with(|| Value::from(text.clone()));
        }
        if failed {
            reply
                .entry("errorText")
                .or_insert_with(|| Value::from("unknown error"));
            reply.entry("errorCode").or_insert_with(|| Value::from(-1));
        }
        reply.insert("returnValue".into(), Value::Bool(!failed));
        Value::Object(reply)
    }

    /// 返信を送る。キューの `remove_after_reply` からのみ呼ぶ
    pub(crate) fn send_reply(self) -> bool {
        let reply = self.build_reply();
        self.responder.send(reply)
    }
}
