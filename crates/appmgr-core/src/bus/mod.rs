//! Bus - バス境界
//!
//! - `api`: カテゴリ `/` のメソッドのルーティングとハンドラ
//! - `subscriptions`: 購読リクエストの保持と変更通知

pub mod api;
pub mod subscriptions;

pub use self::api::Method;
pub use self::subscriptions::{Subscriptions, Topic};
