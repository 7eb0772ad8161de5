//! Watchdog - 遷移中状態のタイマー
//!
//! # 学習ポイント
//! - インスタンスごとに `tokio::spawn` した sleep を 1 本持つ
//! - 再 arm すると古いタスクは abort し、世代番号を進める
//! - 期限切れはコマンドとしてイベントループに戻す。ループ側で世代を照合し、
//!   すでに解除・再 arm されたタイマーの通知は捨てる

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::app::command::Command;
use crate::domain::ids::InstanceId;

pub struct Watchdog {
    timeout: Duration,
    timers: HashMap<InstanceId, (u64, AbortHandle)>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<Command>,
}

impl Watchdog {
    pub fn new(timeout: Duration, tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            timeout,
            timers: HashMap::new(),
            next_generation: 0,
            tx,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// タイマーを（再）始動して世代番号を返す
    pub fn arm(&mut self, instance_id: InstanceId) -> u64 {
        self.disarm(instance_id);
        self.next_generation += 1;
        let generation = self.next_generation;

        let tx = self.tx.clone();
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // ループが終わっていれば送れなくてよい
            let _ = tx.send(Command::WatchdogExpired {
                instance_id,
                generation,
            });
        });
        self.timers
            .insert(instance_id, (generation, handle.abort_handle()));
        generation
    }

    /// 解除。タイマーがあれば true
    pub fn disarm(&mut self, instance_id: InstanceId) -> bool {
        match self.timers.remove(&instance_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_current(&self, instance_id: InstanceId, generation: u64) -> bool {
        self.timers
            .get(&instance_id)
            .is_some_and(|(current, _)| *current == generation)
    }

    /// 発火済みのタイマーを取り除く。現在の世代なら true
    pub fn expire(&mut self, instance_id: InstanceId, generation: u64) -> bool {
        if !self.is_current(instance_id, generation) {
            return false;
        }
        self.timers.remove(&instance_id);
        true
    }

    pub fn is_armed(&self, instance_id: InstanceId) -> bool {
        self.timers.contains_key(&instance_id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn watchdog() -> (Watchdog, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Watchdog::new(Duration::from_secs(10), tx), rx)
    }

    fn expired(command: Command) -> (InstanceId, u64) {
        match command {
            Command::WatchdogExpired {
                instance_id,
                generation,
            } => (instance_id, generation),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let (mut watchdog, mut rx) = watchdog();
        let id = InstanceId::from_ulid(Ulid::new());
        let generation = watchdog.arm(id);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        let (fired, fired_gen) = expired(rx.recv().await.unwrap());
        assert_eq!(fired, id);
        assert_eq!(fired_gen, generation);
        assert!(watchdog.expire(id, generation));
        assert!(!watchdog.is_armed(id));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_cancels_the_timer() {
        let (mut watchdog, mut rx) = watchdog();
        let id = InstanceId::from_ulid(Ulid::new());
        watchdog.arm(id);
        assert!(watchdog.disarm(id));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        assert!(watchdog.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_makes_old_generation_stale() {
        let (mut watchdog, _rx) = watchdog();
        let id = InstanceId::from_ulid(Ulid::new());
        let first = watchdog.arm(id);
        let second = watchdog.arm(id);

        assert_ne!(first, second);
        assert!(!watchdog.is_current(id, first));
        assert!(!watchdog.expire(id, first));
        assert!(watchdog.is_current(id, second));
        assert_eq!(watchdog.len(), 1);
    }
}
