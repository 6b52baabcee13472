// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::price::PriceObservation;
use crate::domain::models::product::ProductSnapshot;
use crate::domain::repositories::price_repository::{PriceRepository, RepositoryError};
use metrics::counter;
use std::sync::Arc;
use tracing::debug;

/// 一次快照写入的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub variants: u64,
    pub observations: u64,
}

/// 价格服务
///
/// 负责按正确顺序持久化抓取结果：先 upsert 商品，再写入变体和价格观测，
/// 保证每条价格观测引用的商品已经存在。
#[derive(Clone)]
pub struct PriceService {
    repository: Arc<dyn PriceRepository>,
}

impl PriceService {
    /// 创建新的价格服务实例
    pub fn new(repository: Arc<dyn PriceRepository>) -> Self {
        Self { repository }
    }

    /// 保存一次商品详情抓取的完整快照
    ///
    /// 商品先于变体和价格写入；价格观测逐条追加，遇到第一个错误即返回。
    pub async fn record_snapshot(
        &self,
        snapshot: &ProductSnapshot,
    ) -> Result<RecordOutcome, RepositoryError> {
        self.repository.upsert_product(&snapshot.product).await?;

        let mut outcome = RecordOutcome::default();
        if !snapshot.variants.is_empty() {
            outcome.variants = self.repository.upsert_variants(&snapshot.variants).await?;
        }

        for observation in &snapshot.observations {
            self.repository.insert_price_observation(observation).await?;
            outcome.observations += 1;
        }
        counter!("pricetrackr_price_observations_total").increment(outcome.observations);

        debug!(
            product_key = %snapshot.product.product_key,
            variants = outcome.variants,
            observations = outcome.observations,
            "Snapshot recorded"
        );
        Ok(outcome)
    }

    /// 查询价格历史，按时间倒序，最多返回 `HISTORY_LIMIT` 条
    pub async fn history(
        &self,
        product_key: &str,
        variant_key: Option<&str>,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        match variant_key {
            Some(variant_key) => {
                self.repository
                    .get_product_history_by_variant(product_key, variant_key)
                    .await
            }
            None => self.repository.get_product_history(product_key).await,
        }
    }
}
