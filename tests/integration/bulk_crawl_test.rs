// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{api, category_page, numbered_page, InMemoryPriceRepository, ScriptedFetcher};
use pricetrackr::application::use_cases::bulk_crawl::BulkCrawlRunner;
use pricetrackr::application::use_cases::category_crawl::{CategoryCrawler, CrawlOptions};
use pricetrackr::domain::repositories::price_repository::PriceRepository;
use std::sync::Arc;
use std::time::Duration;

const SITE: &str = "https://www.digikala.com/";

fn options() -> CrawlOptions {
    CrawlOptions {
        max_products: 0,
        concurrency: 2,
        delay: Duration::ZERO,
    }
}

fn categories(slugs: &[&str]) -> Vec<String> {
    slugs.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_bulk_crawl_saves_products_and_category() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .respond(api().category_search_url("tablet", 1), numbered_page(1, 4, 2))
        .respond(api().category_search_url("tablet", 2), numbered_page(5, 4, 2));
    let repo = Arc::new(InMemoryPriceRepository::new());

    let runner = BulkCrawlRunner::new(
        CategoryCrawler::new(fetcher, api()),
        Some(repo.clone() as Arc<dyn PriceRepository>),
        SITE,
        3,
    );
    let stats = runner.run(&categories(&["tablet"]), options()).await;

    assert_eq!(stats.total_products, 8);
    assert_eq!(stats.saved_products, 8);
    assert_eq!(stats.failed_products, 0);
    assert_eq!(stats.total_pages, 2);
    assert_eq!(stats.failed_categories(), 0);
    assert_eq!(repo.product_count(), 8);

    let product = repo.product("5").unwrap();
    assert_eq!(product.category, "tablet");
    assert!(product.is_tracked);

    let category = repo.category("tablet").unwrap();
    assert_eq!(category.product_count, 8);
    assert_eq!(category.category_name, "تبلت");
    assert_eq!(
        category.category_url,
        "https://www.digikala.com/search/category-tablet/"
    );
    assert!(category.last_crawled.is_some());
}

#[tokio::test]
async fn test_failed_category_does_not_stop_others() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .fail_with(api().category_search_url("laptop", 1), 403)
        .respond(
            api().category_search_url("camera", 1),
            category_page(&[("90", "Camera", "marketable")], 1),
        );
    let repo = Arc::new(InMemoryPriceRepository::new());

    let runner = BulkCrawlRunner::new(
        CategoryCrawler::new(fetcher, api()),
        Some(repo.clone() as Arc<dyn PriceRepository>),
        SITE,
        50,
    );
    let stats = runner.run(&categories(&["laptop", "camera"]), options()).await;

    assert_eq!(stats.categories.len(), 2);
    assert_eq!(stats.failed_categories(), 1);
    assert!(stats.categories[0].error.is_some());
    assert!(stats.categories[1].error.is_none());
    assert_eq!(stats.saved_products, 1);
    assert!(repo.category("laptop").is_none());
    assert!(repo.category("camera").is_some());
}

#[tokio::test]
async fn test_rejected_batches_are_counted_as_failed() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond(api().category_search_url("monitor", 1), numbered_page(1, 5, 1));
    let repo = Arc::new(InMemoryPriceRepository::new());
    repo.fail_writes(true);

    let runner = BulkCrawlRunner::new(
        CategoryCrawler::new(fetcher, api()),
        Some(repo.clone() as Arc<dyn PriceRepository>),
        SITE,
        2,
    );
    let stats = runner.run(&categories(&["monitor"]), options()).await;

    assert_eq!(stats.total_products, 5);
    assert_eq!(stats.saved_products, 0);
    assert_eq!(stats.failed_products, 5);
    assert_eq!(stats.failed_categories(), 0);
    assert_eq!(repo.product_count(), 0);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond(api().category_search_url("speaker", 1), numbered_page(1, 3, 1));

    let runner = BulkCrawlRunner::new(CategoryCrawler::new(fetcher, api()), None, SITE, 10);
    let stats = runner.run(&categories(&["speaker"]), options()).await;

    assert_eq!(stats.total_products, 3);
    assert_eq!(stats.saved_products, 0);
    assert_eq!(stats.failed_products, 0);
}
