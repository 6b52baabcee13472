// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scrape_task::ScrapeTask;
use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 消息代理通信失败
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// 任务编码失败
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// 重试后仍无法连接消息代理
    #[error("Could not connect to broker after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },
}

/// 任务处理器特质
///
/// 返回 `Ok` 时消息被确认；返回 `Err` 时消息重新入队。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError>;
}

#[async_trait]
impl<T: TaskHandler + ?Sized> TaskHandler for Arc<T> {
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError> {
        (**self).handle(task).await
    }
}

/// 消息处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 处理成功，从队列中移除
    Ack,
    /// 处理失败，重新入队
    Requeue,
    /// 无法解码，直接丢弃
    Drop,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Drop => "drop",
        }
    }
}

/// 解码消息并交给处理器，返回该消息的处理结果
///
/// 所有队列后端共用这一段逻辑，保证确认语义一致
pub async fn dispatch(payload: &[u8], handler: &dyn TaskHandler) -> Disposition {
    let disposition = match ScrapeTask::decode(payload) {
        Ok(task) => match handler.handle(&task).await {
            Ok(()) => {
                debug!(task = %task, "Task acknowledged");
                Disposition::Ack
            }
            Err(e) => {
                warn!(
                    task = %task,
                    stage = %e.stage(),
                    error = %e,
                    "Task failed, requeueing"
                );
                Disposition::Requeue
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Dropping undecodable message"
            );
            Disposition::Drop
        }
    };

    counter!("pricetrackr_tasks_processed_total", "outcome" => disposition.as_str()).increment(1);
    disposition
}

/// 任务队列特质
///
/// 至少一次投递：消息只有在被确认后才离开队列。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 声明（必要时创建）持久化队列
    async fn declare(&self, name: &str) -> Result<(), QueueError>;

    /// 发布任务
    async fn publish(&self, name: &str, task: &ScrapeTask) -> Result<(), QueueError>;

    /// 持续消费队列直到取消
    ///
    /// # 参数
    ///
    /// * `name` - 队列名
    /// * `handler` - 任务处理器，一次处理一条消息
    /// * `cancel` - 取消令牌，触发后在当前消息处理完成后返回
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 因取消而停止
    /// * `Err(QueueError)` - 消息代理故障
    async fn consume(
        &self,
        name: &str,
        handler: &dyn TaskHandler,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError>;

    /// 队列中等待处理的消息数
    async fn depth(&self, name: &str) -> Result<usize, QueueError>;
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn declare(&self, name: &str) -> Result<(), QueueError> {
        (**self).declare(name).await
    }

    async fn publish(&self, name: &str, task: &ScrapeTask) -> Result<(), QueueError> {
        (**self).publish(name, task).await
    }

    async fn consume(
        &self,
        name: &str,
        handler: &dyn TaskHandler,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        (**self).consume(name, handler, cancel).await
    }

    async fn depth(&self, name: &str) -> Result<usize, QueueError> {
        (**self).depth(name).await
    }
}
