// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::product::Product;
use crate::engines::endpoints::UpstreamApi;
use crate::engines::parser::{parse_category_page, ParseError};
use crate::engines::traits::{FetchError, Fetcher};
use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 单页抓取错误
#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// 分类爬取错误
#[derive(Error, Debug)]
pub enum CrawlError {
    /// 第一页失败时无法得知总页数，整个分类放弃
    #[error("First page of category {category} failed: {source}")]
    FirstPage {
        category: String,
        #[source]
        source: PageError,
    },
}

/// 分类爬取参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// 商品数量上限，0表示不限
    pub max_products: usize,
    /// 并发抓取页面的 worker 数，最少为1
    pub concurrency: usize,
    /// 每次页面抓取后的固定等待
    pub delay: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_products: 0,
            concurrency: 3,
            delay: Duration::from_millis(2000),
        }
    }
}

/// 一个分类的爬取结果
#[derive(Debug, Clone, Default)]
pub struct CategoryCrawl {
    pub category: String,
    pub products: Vec<Product>,
    pub total_pages: u32,
    /// 抓取或解析失败而被跳过的页码
    pub failed_pages: Vec<u32>,
}

#[derive(Default)]
struct Collected {
    products: Vec<Product>,
    seen: HashSet<String>,
    failed_pages: Vec<u32>,
}

impl Collected {
    /// 重复的商品键只保留第一次出现的记录
    fn push_unique(&mut self, products: Vec<Product>) {
        for product in products {
            if self.seen.insert(product.product_key.clone()) {
                self.products.push(product);
            }
        }
    }
}

/// 多个页面 worker 共享的结果累加器
///
/// 上限检查、去重和追加在同一把锁内完成，
/// 相邻页面重叠的商品不会占用上限
struct ProductAccumulator {
    cap: usize,
    inner: Mutex<Collected>,
}

impl ProductAccumulator {
    fn new(cap: usize, first_page: Vec<Product>) -> Self {
        let mut collected = Collected::default();
        collected.push_unique(first_page);
        Self {
            cap,
            inner: Mutex::new(collected),
        }
    }

    fn is_full(&self) -> bool {
        self.cap > 0 && self.inner.lock().products.len() >= self.cap
    }

    /// 追加一页商品，返回追加后的不重复商品总数
    fn extend(&self, products: Vec<Product>) -> usize {
        let mut inner = self.inner.lock();
        inner.push_unique(products);
        inner.products.len()
    }

    fn record_failure(&self, page: u32) {
        self.inner.lock().failed_pages.push(page);
    }

    fn into_inner(self) -> Collected {
        self.inner.into_inner()
    }
}

/// 分类爬取编排器
///
/// 第一页同步抓取以获得总页数，其余页面分发给固定数量的 worker 并发抓取。
/// 单页失败只记录并跳过，不影响其他页面。
#[derive(Clone)]
pub struct CategoryCrawler {
    fetcher: Arc<dyn Fetcher>,
    api: UpstreamApi,
}

impl CategoryCrawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, api: UpstreamApi) -> Self {
        Self { fetcher, api }
    }

    async fn fetch_page(
        &self,
        category: &str,
        page: u32,
    ) -> Result<(Vec<Product>, u32), PageError> {
        let url = self.api.category_search_url(category, page);
        let body = self.fetcher.get(&url).await?;
        let parsed = parse_category_page(&body, category, Utc::now())?;
        counter!("pricetrackr_pages_fetched_total").increment(1);
        Ok(parsed)
    }

    /// 爬取一个分类的全部商品
    ///
    /// # 参数
    ///
    /// * `category` - 分类slug
    /// * `options` - 上限、并发数和页面间隔
    ///
    /// # 返回值
    ///
    /// * `Ok(CategoryCrawl)` - 商品数量不超过 `max_products`（大于0时）
    /// * `Err(CrawlError::FirstPage)` - 第一页失败
    pub async fn crawl_category(
        &self,
        category: &str,
        options: CrawlOptions,
    ) -> Result<CategoryCrawl, CrawlError> {
        let (first_products, total_pages) = self
            .fetch_page(category, 1)
            .await
            .map_err(|source| {
                counter!("pricetrackr_pages_failed_total").increment(1);
                CrawlError::FirstPage {
                    category: category.to_string(),
                    source,
                }
            })?;

        info!(
            category,
            total_pages,
            first_page_products = first_products.len(),
            "First page fetched"
        );

        let accumulator = Arc::new(ProductAccumulator::new(options.max_products, first_products));

        if total_pages > 1 && !accumulator.is_full() {
            tokio::time::sleep(options.delay).await;
            self.fan_out(category, total_pages, options, accumulator.clone())
                .await;
        }

        // Workers are joined by now, so this is the last reference
        let collected = Arc::into_inner(accumulator)
            .map(ProductAccumulator::into_inner)
            .unwrap_or_default();

        let mut products = collected.products;
        if options.max_products > 0 && products.len() > options.max_products {
            products.truncate(options.max_products);
        }
        let mut failed_pages = collected.failed_pages;
        failed_pages.sort_unstable();

        info!(
            category,
            products = products.len(),
            failed_pages = failed_pages.len(),
            "Category crawl finished"
        );

        Ok(CategoryCrawl {
            category: category.to_string(),
            products,
            total_pages,
            failed_pages,
        })
    }

    async fn fan_out(
        &self,
        category: &str,
        total_pages: u32,
        options: CrawlOptions,
        accumulator: Arc<ProductAccumulator>,
    ) {
        let remaining = (total_pages - 1) as usize;
        let (tx, rx) = mpsc::channel::<u32>(remaining);
        for page in 2..=total_pages {
            if tx.send(page).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = options.concurrency.max(1).min(remaining);
        let mut set = JoinSet::new();

        for worker_id in 0..workers {
            let crawler = self.clone();
            let category = category.to_string();
            let rx = rx.clone();
            let accumulator = accumulator.clone();
            let delay = options.delay;

            set.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(page) = next else { break };

                    // Keep draining the channel once the cap is reached
                    if accumulator.is_full() {
                        debug!(worker_id, page, "Product cap reached, skipping page");
                        continue;
                    }

                    match crawler.fetch_page(&category, page).await {
                        Ok((products, _)) => {
                            let count = products.len();
                            let total = accumulator.extend(products);
                            debug!(worker_id, page, count, total, "Page fetched");
                        }
                        Err(e) => {
                            counter!("pricetrackr_pages_failed_total").increment(1);
                            warn!(worker_id, category = %category, page, error = %e, "Page failed, skipping");
                            accumulator.record_failure(page);
                        }
                    }

                    tokio::time::sleep(delay).await;
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(category, error = %e, "Page worker panicked");
            }
        }
    }
}
