// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::scrape_task::ScrapeTask;
use crate::domain::services::price_service::{PriceService, RecordOutcome};
use crate::engines::endpoints::UpstreamApi;
use crate::engines::parser::parse_product_detail;
use crate::engines::traits::Fetcher;
use crate::queue::task_queue::TaskHandler;
use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// 抓取工作者
///
/// 处理单个抓取任务：获取商品详情、解析、持久化。
/// 所有写入都是基于键的 upsert 或追加，重复投递同一任务是安全的。
pub struct ScrapeWorker {
    fetcher: Arc<dyn Fetcher>,
    api: UpstreamApi,
    prices: PriceService,
}

impl ScrapeWorker {
    /// 创建新的抓取工作器实例
    pub fn new(fetcher: Arc<dyn Fetcher>, api: UpstreamApi, prices: PriceService) -> Self {
        Self {
            fetcher,
            api,
            prices,
        }
    }

    /// 抓取并保存一个任务的结果
    ///
    /// # 返回值
    ///
    /// * `Ok(RecordOutcome)` - 写入的变体和价格数量
    /// * `Err(WorkerError)` - 失败阶段及原因
    pub async fn process(&self, task: &ScrapeTask) -> Result<RecordOutcome, WorkerError> {
        let product_key = task.product_key.as_str();
        let url = self
            .api
            .product_detail_url(product_key, task.variant_key.as_deref());

        let body = self
            .fetcher
            .get(&url)
            .await
            .map_err(|source| WorkerError::Fetch {
                product_key: product_key.to_string(),
                source,
            })?;

        let mut snapshot =
            parse_product_detail(&body, product_key, Utc::now()).map_err(|source| {
                WorkerError::Parse {
                    product_key: product_key.to_string(),
                    source,
                }
            })?;

        if let Some(variant_key) = task.variant_key.as_deref() {
            snapshot
                .observations
                .retain(|observation| observation.variant_key == variant_key);
            if !snapshot
                .variants
                .iter()
                .any(|variant| variant.variant_key == variant_key)
            {
                warn!(
                    product_key,
                    variant_key, "Requested variant not present in product detail"
                );
            }
        }

        self.prices
            .record_snapshot(&snapshot)
            .await
            .map_err(|source| WorkerError::Persist {
                product_key: product_key.to_string(),
                source,
            })
    }
}

#[async_trait]
impl TaskHandler for ScrapeWorker {
    #[instrument(skip(self, task), fields(product_key = %task.product_key, variant_key = ?task.variant_key))]
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError> {
        match self.process(task).await {
            Ok(outcome) => {
                counter!("pricetrackr_scrapes_total", "outcome" => "saved").increment(1);
                info!(
                    variants = outcome.variants,
                    observations = outcome.observations,
                    "Product scraped"
                );
                Ok(())
            }
            Err(e) if !e.is_transient() => {
                // Acknowledged so the same payload is not fetched again
                counter!("pricetrackr_scrapes_total", "outcome" => "unparseable").increment(1);
                error!(
                    product_key = e.product_key(),
                    stage = %e.stage(),
                    error = %e,
                    "Discarding task with unparseable response"
                );
                Ok(())
            }
            Err(e) => {
                if let WorkerError::Fetch { source, .. } = &e {
                    if source.is_blocked() {
                        counter!("pricetrackr_scrapes_total", "outcome" => "blocked").increment(1);
                        warn!(status = ?source.status(), "Upstream blocked request, requeueing");
                        return Err(e);
                    }
                }
                counter!("pricetrackr_scrapes_total", "outcome" => "failed").increment(1);
                Err(e)
            }
        }
    }
}
