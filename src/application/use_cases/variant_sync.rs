// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::price_repository::{PriceRepository, RepositoryError};
use crate::engines::endpoints::UpstreamApi;
use crate::engines::parser::parse_product_detail;
use crate::engines::traits::Fetcher;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 变体同步结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantSyncReport {
    pub products: usize,
    pub variants: u64,
    pub failed: usize,
}

/// 变体同步
///
/// 按优先级依次获取每个跟踪中商品的详情，写入其全部变体。
/// 变体的可售状态每次都会重新同步。
pub struct VariantSync {
    fetcher: Arc<dyn Fetcher>,
    api: UpstreamApi,
    repository: Arc<dyn PriceRepository>,
    delay: Duration,
}

impl VariantSync {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        api: UpstreamApi,
        repository: Arc<dyn PriceRepository>,
        delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            api,
            repository,
            delay,
        }
    }

    /// 同步所有跟踪中商品的变体
    ///
    /// 单个商品失败只计数，不中断整体流程
    pub async fn run(&self) -> Result<VariantSyncReport, RepositoryError> {
        let products = self.repository.get_tracked_products().await?;
        info!(products = products.len(), "Syncing variants");

        let mut report = VariantSyncReport::default();
        for (index, product) in products.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.delay).await;
            }
            report.products += 1;

            let key = product.product_key.as_str();
            let url = self.api.product_detail_url(key, None);
            let body = match self.fetcher.get(&url).await {
                Ok(body) => body,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = key, stage = "fetch", error = %e, "Variant sync failed");
                    continue;
                }
            };

            let snapshot = match parse_product_detail(&body, key, Utc::now()) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = key, stage = "parse", error = %e, "Variant sync failed");
                    continue;
                }
            };

            if snapshot.variants.is_empty() {
                continue;
            }
            match self.repository.upsert_variants(&snapshot.variants).await {
                Ok(n) => report.variants += n,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = key, stage = "persist", error = %e, "Variant sync failed");
                }
            }
        }

        info!(
            products = report.products,
            variants = report.variants,
            failed = report.failed,
            "Variant sync finished"
        );
        Ok(report)
    }
}
