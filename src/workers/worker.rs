// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::scheduler::HotProductScheduler;
use crate::queue::task_queue::{TaskHandler, TaskQueue};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Worker trait定义
///
/// 所有后台工作器都必须实现此trait，取消令牌触发后应尽快返回
#[async_trait]
pub trait Worker: Send + Sync {
    /// 运行工作器直到取消或出现不可恢复的错误
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// 获取工作器名称
    fn name(&self) -> &str;
}

/// 队列消费工作器
///
/// 从一个命名队列中逐条取出任务交给处理器，每个进程一个消费循环
pub struct QueueWorker {
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
    handler: Arc<dyn TaskHandler>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        queue_name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            handler,
        }
    }
}

#[async_trait]
impl Worker for QueueWorker {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.queue.declare(&self.queue_name).await?;
        info!(queue = %self.queue_name, "Queue worker started");
        self.queue
            .consume(&self.queue_name, self.handler.as_ref(), &cancel)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "queue-worker"
    }
}

#[async_trait]
impl Worker for HotProductScheduler {
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.run_loop(cancel).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "hot-product-scheduler"
    }
}
