//! Subscriptions - 購読リクエストの保持と通知配信
//!
//! 購読キーはメソッド名。返信チャネルが閉じた購読者は次の配信時に取り除く。

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::envelope::Responder;

/// 購読キー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Running,
    LifeStatus,
    /// フルスクリーンのオーナーが変わったときだけ
    Foreground,
    /// メタデータだけの変化も含む
    ForegroundExtra,
    LaunchPoints,
    Apps,
}

#[derive(Debug, Clone)]
struct Subscriber {
    responder: Responder,
    /// 特定アプリだけを見る購読（getAppLifeStatus {id}）
    app_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Subscriptions {
    topics: HashMap<Topic, Vec<Subscriber>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, topic: Topic, responder: Responder, app_id: Option<String>) {
        self.topics
            .entry(topic)
            .or_default()
            .push(Subscriber { responder, app_id });
    }

    /// 全購読者へ配信。`returnValue` と `subscribed` を付ける
    pub fn publish(&mut self, topic: Topic, payload: Value) {
        self.publish_filtered(topic, None, payload);
    }

    /// app_id 指定の購読者は一致したものだけに配信する
    pub fn publish_for_app(&mut self, topic: Topic, app_id: &str, payload: Value) {
        self.publish_filtered(topic, Some(app_id), payload);
    }

    fn publish_filtered(&mut self, topic: Topic, app_id: Option<&str>, payload: Value) {
        let Some(subscribers) = self.topics.get_mut(&topic) else {
            return;
        };
        let payload = with_envelope(payload);
        subscribers.retain(|sub| {
            let wanted = match (&sub.app_id, app_id) {
                (Some(filter), Some(app_id)) => filter == app_id,
                _ => true,
            };
            if !wanted {
                return !sub.responder.is_closed();
            }
            sub.responder.send(payload.clone())
        });
        if subscribers.is_empty() {
            self.topics.remove(&topic);
        }
    }

    pub fn len(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

fn with_envelope(payload: Value) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".into(), other);
            map
        }
    };
    map.insert("returnValue".into(), Value::Bool(true));
    map.insert("subscribed".into(), Value::Bool(true));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_reaches_every_subscriber() {
        let mut subs = Subscriptions::new();
        let (a, mut rx_a) = Responder::channel();
        let (b, mut rx_b) = Responder::channel();
        subs.add(Topic::Running, a, None);
        subs.add(Topic::Running, b, None);

        subs.publish(Topic::Running, json!({"running": []}));

        for rx in [&mut rx_a, &mut rx_b] {
            let msg = rx.try_recv().unwrap();
            assert_eq!(msg["returnValue"], true);
            assert_eq!(msg["subscribed"], true);
        }
    }

    #[test]
    fn closed_channels_are_pruned() {
        let mut subs = Subscriptions::new();
        let (a, rx_a) = Responder::channel();
        let (b, _rx_b) = Responder::channel();
        subs.add(Topic::LaunchPoints, a, None);
        subs.add(Topic::LaunchPoints, b, None);
        drop(rx_a);

        subs.publish(Topic::LaunchPoints, json!({}));
        assert_eq!(subs.subscriber_count(Topic::LaunchPoints), 1);
    }

    #[test]
    fn app_filter_limits_delivery() {
        let mut subs = Subscriptions::new();
        let (foo, mut rx_foo) = Responder::channel();
        let (all, mut rx_all) = Responder::channel();
        subs.add(Topic::LifeStatus, foo, Some("com.foo".into()));
        subs.add(Topic::LifeStatus, all, None);

        subs.publish_for_app(Topic::LifeStatus, "com.bar", json!({"appId": "com.bar"}));

        assert!(rx_foo.try_recv().is_err());
        assert_eq!(rx_all.try_recv().unwrap()["appId"], "com.bar");
        assert_eq!(subs.len(), 2);
    }
}
