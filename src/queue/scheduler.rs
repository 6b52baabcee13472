// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::price_repository::RepositoryError;
use crate::domain::services::selection_policy::SelectionPolicy;
use crate::queue::task_queue::TaskQueue;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 单个调度周期的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub selected: usize,
    pub published: usize,
    pub failed: usize,
}

/// 热门商品调度器
///
/// 启动后立即执行一个周期，之后按固定间隔执行；错过的周期直接跳过。
/// 每个周期先由选择策略选出到期商品，再逐个发布抓取任务。
pub struct HotProductScheduler {
    policy: Arc<dyn SelectionPolicy>,
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
    period: Duration,
}

impl HotProductScheduler {
    /// 创建新的调度器实例
    ///
    /// # 参数
    ///
    /// * `policy` - 选择策略
    /// * `queue` - 任务队列
    /// * `queue_name` - 发布任务的队列名
    /// * `period` - 调度间隔
    pub fn new(
        policy: Arc<dyn SelectionPolicy>,
        queue: Arc<dyn TaskQueue>,
        queue_name: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            policy,
            queue,
            queue_name: queue_name.into(),
            period,
        }
    }

    /// 执行一个调度周期
    ///
    /// 单个任务发布失败只记录日志，不中断本周期
    pub async fn run_cycle(&self) -> Result<CycleReport, RepositoryError> {
        let tasks = self.policy.select_due(Utc::now()).await?;

        let mut report = CycleReport {
            selected: tasks.len(),
            ..CycleReport::default()
        };

        for task in &tasks {
            match self.queue.publish(&self.queue_name, task).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(task = %task, error = %e, "Failed to publish scrape task");
                }
            }
        }

        counter!("pricetrackr_tasks_published_total").increment(report.published as u64);
        info!(
            policy = self.policy.name(),
            selected = report.selected,
            published = report.published,
            failed = report.failed,
            "Scheduling cycle finished"
        );
        Ok(report)
    }

    /// 运行调度循环直到取消
    pub async fn run_loop(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.period.as_secs(),
            queue = %self.queue_name,
            "Hot product scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Failed to select due products");
                    }
                }
            }
        }

        info!("Hot product scheduler stopped");
    }
}
