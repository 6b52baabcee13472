// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scrape_task::ScrapeTask;
use crate::domain::repositories::price_repository::{
    DueProductQuery, PriceRepository, RepositoryError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// 热门商品选择策略
///
/// 决定每个调度周期需要重新抓取哪些商品。实现必须满足：
/// 对相同的存储状态结果确定、单次结果数量有上限、选择过程不修改任何状态。
#[async_trait]
pub trait SelectionPolicy: Send + Sync {
    /// 选出在 `now` 时刻到期的商品任务
    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<ScrapeTask>, RepositoryError>;

    /// 策略名称
    fn name(&self) -> &'static str;
}

/// 基于陈旧度和优先级的选择策略
///
/// 跟踪中且可售的商品，满足以下任一条件即到期：
/// - 从未被抓取
/// - 最近一次抓取早于 `stale_after` 之前
/// - 优先级不低于 `priority_threshold`
pub struct StalenessPolicy {
    repository: Arc<dyn PriceRepository>,
    stale_after: Duration,
    priority_threshold: i32,
    limit: u64,
}

impl StalenessPolicy {
    /// 创建新的陈旧度策略
    ///
    /// # 参数
    ///
    /// * `repository` - 价格仓库
    /// * `stale_after` - 超过该时长未抓取即视为陈旧
    /// * `priority_threshold` - 达到该优先级的商品每个周期都会被选中
    /// * `limit` - 单个周期最多选出的商品数
    pub fn new(
        repository: Arc<dyn PriceRepository>,
        stale_after: Duration,
        priority_threshold: i32,
        limit: u64,
    ) -> Self {
        Self {
            repository,
            stale_after,
            priority_threshold,
            limit,
        }
    }

    /// 根据当前时间生成查询条件
    pub fn query_at(&self, now: DateTime<Utc>) -> DueProductQuery {
        DueProductQuery {
            stale_before: now - self.stale_after,
            min_priority: self.priority_threshold,
            limit: self.limit,
        }
    }
}

#[async_trait]
impl SelectionPolicy for StalenessPolicy {
    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<ScrapeTask>, RepositoryError> {
        if self.limit == 0 {
            return Ok(Vec::new());
        }

        let products = self.repository.find_due_products(&self.query_at(now)).await?;
        Ok(products
            .into_iter()
            .take(self.limit as usize)
            .map(|product| ScrapeTask::product(product.product_key))
            .collect())
    }

    fn name(&self) -> &'static str {
        "staleness"
    }
}
