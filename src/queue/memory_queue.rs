// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scrape_task::ScrapeTask;
use crate::queue::task_queue::{dispatch, Disposition, QueueError, TaskHandler, TaskQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 空闲时的兜底轮询间隔
const IDLE_POLL: Duration = Duration::from_millis(100);

/// 单个队列的处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub published: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Vec<u8>>,
    stats: QueueStats,
}

/// 进程内任务队列
///
/// 用于单进程 `serve` 模式和测试，确认语义与 Redis 后端一致：
/// 失败的消息放回队尾，排在已有消息之后重新投递，无法解码的消息被丢弃。
#[derive(Default)]
pub struct MemoryTaskQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    notify: Notify,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入原始消息体，不做编码
    pub fn publish_raw(&self, name: &str, payload: Vec<u8>) {
        {
            let mut queues = self.queues.lock();
            let state = queues.entry(name.to_string()).or_default();
            state.messages.push_back(payload);
            state.stats.published += 1;
        }
        self.notify.notify_one();
    }

    /// 获取队列统计
    pub fn stats(&self, name: &str) -> QueueStats {
        self.queues
            .lock()
            .get(name)
            .map(|state| state.stats)
            .unwrap_or_default()
    }

    pub fn len(&self, name: &str) -> usize {
        self.queues
            .lock()
            .get(name)
            .map(|state| state.messages.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }

    fn pop(&self, name: &str) -> Option<Vec<u8>> {
        self.queues
            .lock()
            .get_mut(name)
            .and_then(|state| state.messages.pop_front())
    }

    fn settle(&self, name: &str, payload: Vec<u8>, disposition: Disposition) {
        let mut queues = self.queues.lock();
        let state = queues.entry(name.to_string()).or_default();
        match disposition {
            Disposition::Ack => state.stats.acked += 1,
            Disposition::Drop => state.stats.dropped += 1,
            Disposition::Requeue => {
                state.stats.requeued += 1;
                state.messages.push_back(payload);
            }
        }
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn declare(&self, name: &str) -> Result<(), QueueError> {
        self.queues.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, name: &str, task: &ScrapeTask) -> Result<(), QueueError> {
        let payload = task.encode()?;
        self.publish_raw(name, payload);
        Ok(())
    }

    async fn consume(
        &self,
        name: &str,
        handler: &dyn TaskHandler,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        info!(queue = name, "Consuming from in-memory queue");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.pop(name) {
                Some(payload) => {
                    let disposition = dispatch(&payload, handler).await;
                    self.settle(name, payload, disposition);
                    // A requeued message is immediately ready again, let other tasks run
                    tokio::task::yield_now().await;
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
        info!(queue = name, "In-memory consumer stopped");
        Ok(())
    }

    async fn depth(&self, name: &str) -> Result<usize, QueueError> {
        Ok(self.len(name))
    }
}
