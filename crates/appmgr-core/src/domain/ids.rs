//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! インスタンス ID とタスク UUID は ULID をそのまま使い、
//! `Id<T>` の `T` をマーカー型にしてコンパイル時に混同を防ぎます。
//!
//! - `InstanceId`: 起動したアプリインスタンス（一度だけ割り当て、以後不変）
//! - `TaskUuid`: LunaTask の内部相関 ID
//!
//! バス・トークン (`BusToken`) は ULID ではなく、コアが単調増加で払い出す数値です。

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"inst-", "task-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// ```ignore
/// let instance: InstanceId = Id::from(Ulid::new());
/// let task: TaskUuid = Id::from(Ulid::new());
/// // instance と task は異なる型なので、混同できない
/// ```
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

// derive だと `T: Clone` を要求してしまうので手で書く
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Display 形式（"inst-01H..."）から復元する。プレフィックスなしの ULID も受け付ける。
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.strip_prefix(T::prefix()).unwrap_or(text);
        Ulid::from_string(raw).ok().map(Self::from_ulid)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// バスに出すときは Display 形式の文字列
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instance {}

impl IdMarker for Instance {
    fn prefix() -> &'static str {
        "inst-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of one running (or transitioning-to-run) application instance.
pub type InstanceId = Id<Instance>;

/// Internal correlation id of a LunaTask.
pub type TaskUuid = Id<Request>;

/// Opaque handle correlating an asynchronous collaborator call with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BusToken(u64);

impl BusToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 単調増加でトークンを払い出す。0 は使わない。
#[derive(Debug, Default)]
pub struct TokenAllocator {
    last: u64,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&mut self) -> BusToken {
        self.last += 1;
        BusToken(self.last)
    }
}
