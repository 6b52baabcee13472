// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::category_crawl::{CategoryCrawler, CrawlOptions};
use crate::domain::models::category::Category;
use crate::domain::models::product::Product;
use crate::domain::repositories::price_repository::PriceRepository;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 单个分类的爬取统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryResult {
    pub category: String,
    pub products: usize,
    pub saved: u64,
    pub failed: u64,
    pub pages: u32,
    pub failed_pages: Vec<u32>,
    pub duration: Duration,
    /// 分类整体失败时的原因
    pub error: Option<String>,
}

/// 一次批量爬取的汇总统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub total_products: usize,
    pub saved_products: u64,
    pub failed_products: u64,
    pub total_pages: u64,
    pub categories: Vec<CategoryResult>,
}

impl CrawlStats {
    pub fn failed_categories(&self) -> usize {
        self.categories.iter().filter(|c| c.error.is_some()).count()
    }

    fn add(&mut self, result: CategoryResult) {
        self.total_products += result.products;
        self.saved_products += result.saved;
        self.failed_products += result.failed;
        self.total_pages += u64::from(result.pages);
        self.categories.push(result);
    }
}

/// 批量分类爬取
///
/// 依次爬取每个分类，按批写入发现的商品并更新分类记录。
/// 分类之间互不影响，失败只体现在统计中。
pub struct BulkCrawlRunner {
    crawler: CategoryCrawler,
    /// 为 `None` 时只爬取不写入（dry run）
    repository: Option<Arc<dyn PriceRepository>>,
    site_url: String,
    batch_size: usize,
}

impl BulkCrawlRunner {
    pub fn new(
        crawler: CategoryCrawler,
        repository: Option<Arc<dyn PriceRepository>>,
        site_url: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            crawler,
            repository,
            site_url: site_url.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// 依次爬取给定分类
    ///
    /// 每次运行分配一个 `run_id`，该次运行的所有日志都带有这个字段
    pub async fn run(&self, categories: &[String], options: CrawlOptions) -> CrawlStats {
        let span = info_span!("bulk_crawl", run_id = %Uuid::new_v4());
        self.run_categories(categories, options).instrument(span).await
    }

    async fn run_categories(&self, categories: &[String], options: CrawlOptions) -> CrawlStats {
        let mut stats = CrawlStats::default();
        for category in categories {
            let result = self.crawl_one(category, options).await;
            match &result.error {
                Some(reason) => error!(category = %category, reason = %reason, "Category failed"),
                None => info!(
                    category = %category,
                    products = result.products,
                    saved = result.saved,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "Category completed"
                ),
            }
            stats.add(result);
        }

        info!(
            total_products = stats.total_products,
            saved = stats.saved_products,
            failed = stats.failed_products,
            pages = stats.total_pages,
            failed_categories = stats.failed_categories(),
            "Bulk crawl finished"
        );
        stats
    }

    async fn crawl_one(&self, category: &str, options: CrawlOptions) -> CategoryResult {
        let started = Instant::now();
        let mut result = CategoryResult {
            category: category.to_string(),
            ..CategoryResult::default()
        };

        let crawl = match self.crawler.crawl_category(category, options).await {
            Ok(crawl) => crawl,
            Err(e) => {
                result.error = Some(e.to_string());
                result.duration = started.elapsed();
                return result;
            }
        };

        result.products = crawl.products.len();
        result.pages = crawl.total_pages;
        result.failed_pages = crawl.failed_pages;

        match &self.repository {
            None => info!(category, products = result.products, "Dry run, skipping save"),
            Some(repository) => {
                let (saved, failed) =
                    save_products(repository.as_ref(), crawl.products, self.batch_size)
                        .await;
                result.saved = saved;
                result.failed = failed;

                let record =
                    Category::from_crawl(category, &self.site_url, result.products, Utc::now());
                if let Err(e) = repository.upsert_category(&record).await {
                    warn!(category, error = %e, "Failed to update category record");
                }
            }
        }

        result.duration = started.elapsed();
        result
    }
}

/// 按批写入商品，返回 (成功数, 失败数)
async fn save_products(
    repository: &dyn PriceRepository,
    products: Vec<Product>,
    batch_size: usize,
) -> (u64, u64) {
    let mut saved = 0;
    let mut failed = 0;
    let total = products.len();

    for (index, batch) in products.chunks(batch_size).enumerate() {
        let start = index * batch_size + 1;
        match repository.upsert_discovered_products(batch).await {
            Ok(n) => saved += n,
            Err(e) => {
                failed += batch.len() as u64;
                warn!(
                    from = start,
                    to = start + batch.len() - 1,
                    total,
                    error = %e,
                    "Failed to save product batch"
                );
            }
        }
    }
    (saved, failed)
}
