// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::product::ProductVariant;
use crate::domain::repositories::price_repository::{PriceRepository, RepositoryError};
use crate::domain::services::price_service::PriceService;
use crate::engines::endpoints::UpstreamApi;
use crate::engines::parser::parse_product_detail;
use crate::engines::traits::Fetcher;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 价格跟踪结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceTrackingReport {
    pub products: usize,
    pub observations: u64,
    pub failed: usize,
}

/// 按商品分组可跟踪变体，保持输入（优先级）顺序
pub fn group_by_product(variants: Vec<ProductVariant>) -> Vec<(String, HashSet<String>)> {
    let mut groups: Vec<(String, HashSet<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for variant in variants {
        match index.get(&variant.product_key) {
            Some(&i) => {
                groups[i].1.insert(variant.variant_key);
            }
            None => {
                index.insert(variant.product_key.clone(), groups.len());
                groups.push((
                    variant.product_key,
                    HashSet::from([variant.variant_key]),
                ));
            }
        }
    }
    groups
}

/// 价格跟踪
///
/// 为所有可跟踪变体记录当前价格，每个商品只请求一次详情
pub struct PriceTracker {
    fetcher: Arc<dyn Fetcher>,
    api: UpstreamApi,
    repository: Arc<dyn PriceRepository>,
    prices: PriceService,
    delay: Duration,
}

impl PriceTracker {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        api: UpstreamApi,
        repository: Arc<dyn PriceRepository>,
        delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            api,
            prices: PriceService::new(repository.clone()),
            repository,
            delay,
        }
    }

    pub async fn run(&self) -> Result<PriceTrackingReport, RepositoryError> {
        let variants = self.repository.get_active_trackable_variants().await?;
        let groups = group_by_product(variants);
        info!(products = groups.len(), "Tracking prices");

        let mut report = PriceTrackingReport::default();
        for (index, (product_key, tracked)) in groups.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.delay).await;
            }
            report.products += 1;

            let url = self.api.product_detail_url(product_key, None);
            let body = match self.fetcher.get(&url).await {
                Ok(body) => body,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = %product_key, stage = "fetch", error = %e, "Price tracking failed");
                    continue;
                }
            };

            let mut snapshot = match parse_product_detail(&body, product_key, Utc::now()) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = %product_key, stage = "parse", error = %e, "Price tracking failed");
                    continue;
                }
            };
            snapshot
                .observations
                .retain(|observation| tracked.contains(&observation.variant_key));

            match self.prices.record_snapshot(&snapshot).await {
                Ok(outcome) => report.observations += outcome.observations,
                Err(e) => {
                    report.failed += 1;
                    warn!(product_key = %product_key, stage = "persist", error = %e, "Price tracking failed");
                }
            }
        }

        info!(
            products = report.products,
            observations = report.observations,
            failed = report.failed,
            "Price tracking finished"
        );
        Ok(report)
    }
}
