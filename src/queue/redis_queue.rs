// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::QueueSettings;
use crate::domain::models::scrape_task::ScrapeTask;
use crate::queue::task_queue::{dispatch, Disposition, QueueError, TaskHandler, TaskQueue};
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 基于 Redis 列表的可靠队列
///
/// 每个队列由两个列表组成：
/// - `{prefix}:{name}:ready` 等待处理的消息，`LPUSH` 写入，从右端取出
/// - `{prefix}:{name}:processing:{consumer}` 当前消费者正在处理的消息
///
/// 取出消息时原子地移入处理列表，确认后才删除，因此进程崩溃不会丢消息。
/// 处理失败的消息重新 `LPUSH` 到等待列表，排在已有消息之后。
#[derive(Clone)]
pub struct RedisTaskQueue {
    connection: MultiplexedConnection,
    key_prefix: String,
    consumer: String,
    poll_interval: Duration,
}

impl RedisTaskQueue {
    /// 连接 Redis，失败时按退避策略重试
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `settings` - 队列配置
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisTaskQueue)` - 已连接的队列
    /// * `Err(QueueError::Connect)` - 重试次数用尽
    pub async fn connect(redis_url: &str, settings: &QueueSettings) -> Result<Self, QueueError> {
        let policy = RetryPolicy::broker(settings.connect_retries);
        let connection = policy
            .retry("redis connect", || async {
                let client = redis::Client::open(redis_url)?;
                let mut connection = client.get_multiplexed_async_connection().await?;
                redis::cmd("PING")
                    .query_async::<String>(&mut connection)
                    .await?;
                Ok::<_, redis::RedisError>(connection)
            })
            .await
            .map_err(|e| QueueError::Connect {
                attempts: policy.max_attempts,
                reason: e.to_string(),
            })?;

        info!(consumer = %settings.consumer_name, "Connected to redis broker");
        Ok(Self {
            connection,
            key_prefix: settings.key_prefix.clone(),
            consumer: settings.consumer_name.clone(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(10)),
        })
    }

    fn registry_key(&self) -> String {
        format!("{}:queues", self.key_prefix)
    }

    pub fn ready_key(&self, name: &str) -> String {
        format!("{}:{}:ready", self.key_prefix, name)
    }

    pub fn processing_key(&self, name: &str) -> String {
        format!("{}:{}:processing:{}", self.key_prefix, name, self.consumer)
    }

    /// 把上次崩溃时遗留在处理列表中的消息放回等待列表
    async fn recover_stranded(&self, name: &str) -> Result<usize, QueueError> {
        let mut connection = self.connection.clone();
        let processing = self.processing_key(name);
        let ready = self.ready_key(name);

        let mut recovered = 0;
        loop {
            let moved: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(&ready)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut connection)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            warn!(queue = name, recovered, "Recovered stranded in-flight messages");
        }
        Ok(recovered)
    }

    async fn take(&self, name: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let mut connection = self.connection.clone();
        let payload: Option<Vec<u8>> = redis::cmd("LMOVE")
            .arg(self.ready_key(name))
            .arg(self.processing_key(name))
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut connection)
            .await?;
        Ok(payload)
    }

    async fn settle(
        &self,
        name: &str,
        payload: &[u8],
        disposition: Disposition,
    ) -> Result<(), QueueError> {
        let mut connection = self.connection.clone();
        let processing = self.processing_key(name);
        match disposition {
            Disposition::Ack | Disposition::Drop => {
                connection.lrem::<_, _, ()>(&processing, 1, payload).await?;
            }
            Disposition::Requeue => {
                redis::pipe()
                    .atomic()
                    .lrem(&processing, 1, payload)
                    .ignore()
                    // Back of the line so a failing task cannot starve the rest
                    .lpush(self.ready_key(name), payload)
                    .ignore()
                    .query_async::<()>(&mut connection)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn declare(&self, name: &str) -> Result<(), QueueError> {
        let mut connection = self.connection.clone();
        connection
            .sadd::<_, _, ()>(self.registry_key(), name)
            .await?;
        debug!(queue = name, "Queue declared");
        Ok(())
    }

    async fn publish(&self, name: &str, task: &ScrapeTask) -> Result<(), QueueError> {
        let payload = task.encode()?;
        let mut connection = self.connection.clone();
        connection
            .lpush::<_, _, ()>(self.ready_key(name), payload)
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        name: &str,
        handler: &dyn TaskHandler,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        self.recover_stranded(name).await?;
        info!(queue = name, consumer = %self.consumer, "Consuming from redis queue");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.take(name).await? {
                Some(payload) => {
                    let disposition = dispatch(&payload, handler).await;
                    self.settle(name, &payload, disposition).await?;
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        info!(queue = name, "Redis consumer stopped");
        Ok(())
    }

    async fn depth(&self, name: &str) -> Result<usize, QueueError> {
        let mut connection = self.connection.clone();
        let len: usize = connection.llen(self.ready_key(name)).await?;
        Ok(len)
    }
}
