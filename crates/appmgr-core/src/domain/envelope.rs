//! RequestEnvelope - バスから届いたリクエストの運搬用データ
//!
//! - category / method: 例 `"/"` + `"launch"`
//! - payload: JSON オブジェクト
//! - subscribe: true なら返信後も変更通知を受け取り続ける
//!
//! `Responder` は返信チャネル。最初の 1 通が返信、以降は購読通知になる。

use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    category: String,
    method: String,
    payload: Value,
    caller: String,
    subscribe: bool,
}

impl RequestEnvelope {
    pub fn new(category: impl Into<String>, method: impl Into<String>, payload: Value) -> Self {
        let subscribe = payload
            .get("subscribe")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            category: category.into(),
            method: method.into(),
            payload,
            caller: String::new(),
            subscribe,
        }
    }

    /// 呼び出し元の名前。`"com.foo 1234"` や `"com.foo-1234"` のような
    /// サフィックス付きの名前はアプリ ID 部分だけを残す
    pub fn with_caller(mut self, caller: &str) -> Self {
        let end = caller.find([' ', '-']).unwrap_or(caller.len());
        self.caller = caller[..end].to_string();
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// "category/method" 形式。`"/"` カテゴリなら `"/launch"`
    pub fn kind(&self) -> String {
        if self.category.ends_with('/') {
            format!("{}{}", self.category, self.method)
        } else {
            format!("{}/{}", self.category, self.method)
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn is_subscription(&self) -> bool {
        self.subscribe
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// 返信チャネル。clone して購読リストに登録できる
#[derive(Debug, Clone)]
pub struct Responder {
    tx: mpsc::UnboundedSender<Value>,
}

impl Responder {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// 送信できたら true。受信側が閉じていたら false
    pub fn send(&self, payload: Value) -> bool {
        self.tx.send(payload).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Value> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_joins_category_and_method() {
        let root = RequestEnvelope::new("/", "launch", json!({}));
        assert_eq!(root.kind(), "/launch");

        let nested = RequestEnvelope::new("/dev", "status", json!({}));
        assert_eq!(nested.kind(), "/dev/status");
    }

    #[test]
    fn caller_suffix_is_stripped() {
        let req = RequestEnvelope::new("/", "launch", json!({}));
        assert_eq!(req.clone().with_caller("com.foo 1043").caller(), "com.foo");
        assert_eq!(req.clone().with_caller("com.bar-2231").caller(), "com.bar");
        assert_eq!(req.with_caller("com.baz").caller(), "com.baz");
    }

    #[test]
    fn subscribe_flag_comes_from_payload() {
        let req = RequestEnvelope::new("/", "running", json!({"subscribe": true}));
        assert!(req.is_subscription());
        assert!(!RequestEnvelope::new("/", "running", json!({})).is_subscription());
    }

    #[test]
    fn empty_strings_are_absent() {
        let req = RequestEnvelope::new("/", "launch", json!({"id": "", "launchPointId": "x"}));
        assert_eq!(req.str_field("id"), None);
        assert_eq!(req.str_field("launchPointId"), Some("x"));
    }

    #[test]
    fn responder_reports_closed_receiver() {
        let (responder, rx) = Responder::channel();
        assert!(responder.send(json!({"returnValue": true})));
        drop(rx);
        assert!(responder.is_closed());
        assert!(!responder.send(json!({})));
    }
}
