//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock の時刻 + ランダム部）

use crate::domain::ids::{InstanceId, TaskUuid};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はインスタンス ID とタスク UUID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_instance_id(&self) -> InstanceId;

    fn generate_task_uuid(&self) -> TaskUuid;
}

/// Clock を使って現在時刻ベースの ULID を生成する。
/// テストでは FixedClock を渡すと timestamp 部分が固定される。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_instance_id(&self) -> InstanceId {
        InstanceId::from(self.next_ulid())
    }

    fn generate_task_uuid(&self) -> TaskUuid {
        TaskUuid::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_instance_id();
        let id2 = id_gen.generate_instance_id();
        let id3 = id_gen.generate_instance_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_uuid();
        let id2 = id_gen.generate_task_uuid();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);

        // timestamp 部分は同じ
        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(
            id1.as_ulid().timestamp_ms(),
            fixed_time.timestamp_millis() as u64
        );
    }

    #[test]
    fn prefixes_differ_by_id_type() {
        let id_gen = UlidGenerator::new(SystemClock);
        assert!(id_gen.generate_instance_id().to_string().starts_with("inst-"));
        assert!(id_gen.generate_task_uuid().to_string().starts_with("task-"));
    }
}
