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

use anyhow::Context;
use clap::{Parser, Subcommand};
use pricetrackr::application::use_cases::bulk_crawl::BulkCrawlRunner;
use pricetrackr::application::use_cases::category_crawl::{CategoryCrawler, CrawlOptions};
use pricetrackr::application::use_cases::price_tracking::PriceTracker;
use pricetrackr::application::use_cases::variant_sync::VariantSync;
use pricetrackr::config::settings::{QueueBackend, Settings};
use pricetrackr::domain::models::category::KNOWN_CATEGORIES;
use pricetrackr::domain::repositories::price_repository::PriceRepository;
use pricetrackr::domain::services::price_service::PriceService;
use pricetrackr::domain::services::selection_policy::StalenessPolicy;
use pricetrackr::engines::browser_client::BrowserClient;
use pricetrackr::engines::endpoints::UpstreamApi;
use pricetrackr::engines::traits::Fetcher;
use pricetrackr::infrastructure::database::connection;
use pricetrackr::infrastructure::metrics::init_metrics;
use pricetrackr::infrastructure::repositories::price_repo_impl::PriceRepositoryImpl;
use pricetrackr::queue::memory_queue::MemoryTaskQueue;
use pricetrackr::queue::redis_queue::RedisTaskQueue;
use pricetrackr::queue::scheduler::HotProductScheduler;
use pricetrackr::queue::task_queue::TaskQueue;
use pricetrackr::utils::telemetry;
use pricetrackr::workers::scrape_worker::ScrapeWorker;
use pricetrackr::workers::worker::QueueWorker;
use pricetrackr::workers::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_CATEGORY: &str = "mobile-phone";

#[derive(Parser)]
#[command(name = "pricetrackr")]
#[command(about = "Product catalogue crawler and price tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl category listings and store discovered products
    Crawl {
        /// Category slug
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
        /// Maximum products per category, 0 for unlimited
        #[arg(long)]
        max: Option<usize>,
        /// Concurrent page workers
        #[arg(long)]
        concurrency: Option<usize>,
        /// Products per database batch
        #[arg(long)]
        batch: Option<usize>,
        /// Pause after each page fetch in milliseconds
        #[arg(long)]
        delay: Option<u64>,
        /// Crawl without writing to the database
        #[arg(long)]
        dry_run: bool,
        /// Crawl every known category
        #[arg(long)]
        all: bool,
        /// Print the known categories and exit
        #[arg(long)]
        list: bool,
    },

    /// Consume scrape tasks from the queue
    Worker,

    /// Publish scrape tasks for due products on a fixed interval
    Scheduler,

    /// Run worker and scheduler in one process sharing one queue
    Serve,

    /// Refresh variants of every tracked product
    SyncVariants,

    /// Record current prices of every trackable variant
    TrackPrices,

    /// Print stored price history as JSON lines, newest first
    History {
        /// Product key
        #[arg(long)]
        product: String,
        /// Restrict to one variant
        #[arg(long)]
        variant: Option<String>,
    },
}

/// 主函数
///
/// 初始化日志、配置、指标和数据库后分派子命令
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install the ring provider before any TLS connection is made
    let _ = rustls::crypto::ring::default_provider().install_default();

    // 1. Initialize logging
    telemetry::init_telemetry();

    if let Commands::Crawl { list: true, .. } = &cli.command {
        print_categories();
        return Ok(());
    }

    // 2. Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded");

    // 3. Metrics exporter
    init_metrics(&settings.metrics);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match cli.command {
        Commands::Crawl {
            category,
            max,
            concurrency,
            batch,
            delay,
            dry_run,
            all,
            list: _,
        } => {
            let options = CrawlOptions {
                max_products: max.unwrap_or(settings.crawler.max_products),
                concurrency: concurrency.unwrap_or(settings.crawler.concurrency),
                delay: Duration::from_millis(delay.unwrap_or(settings.crawler.delay_ms)),
            };
            let categories: Vec<String> = if all {
                KNOWN_CATEGORIES
                    .iter()
                    .map(|(slug, _)| slug.to_string())
                    .collect()
            } else {
                vec![category]
            };

            let repository = if dry_run {
                None
            } else {
                Some(open_repository(&settings).await?)
            };
            let fetcher = open_fetcher(&settings).await?;
            let crawler =
                CategoryCrawler::new(fetcher, upstream_api(&settings)?);
            let runner = BulkCrawlRunner::new(
                crawler,
                repository,
                &settings.scraper.site_url,
                batch.unwrap_or(settings.crawler.batch_size),
            );
            runner.run(&categories, options).await;
        }

        Commands::Worker => {
            let repository = open_repository(&settings).await?;
            let fetcher = open_fetcher(&settings).await?;
            let queue = open_queue(&settings).await?;
            if settings.queue.backend == QueueBackend::Memory {
                warn!("Memory queue selected for a standalone worker; no tasks will arrive from other processes");
            }
            let worker = queue_worker(&settings, queue, fetcher, repository)?;
            worker.run(cancel).await?;
        }

        Commands::Scheduler => {
            let repository = open_repository(&settings).await?;
            let queue = open_queue(&settings).await?;
            let scheduler = hot_product_scheduler(&settings, queue, repository);
            scheduler.run(cancel).await?;
        }

        Commands::Serve => {
            let repository = open_repository(&settings).await?;
            let fetcher = open_fetcher(&settings).await?;
            let queue = open_queue(&settings).await?;

            let workers: Vec<Arc<dyn Worker>> = vec![
                Arc::new(queue_worker(
                    &settings,
                    queue.clone(),
                    fetcher,
                    repository.clone(),
                )?),
                Arc::new(hot_product_scheduler(&settings, queue, repository)),
            ];
            run_workers(workers, cancel).await?;
        }

        Commands::SyncVariants => {
            let repository = open_repository(&settings).await?;
            let fetcher = open_fetcher(&settings).await?;
            let sync = VariantSync::new(
                fetcher,
                upstream_api(&settings)?,
                repository,
                Duration::from_millis(settings.crawler.delay_ms),
            );
            sync.run().await?;
        }

        Commands::TrackPrices => {
            let repository = open_repository(&settings).await?;
            let fetcher = open_fetcher(&settings).await?;
            let tracker = PriceTracker::new(
                fetcher,
                upstream_api(&settings)?,
                repository,
                Duration::from_millis(settings.crawler.delay_ms),
            );
            tracker.run().await?;
        }

        Commands::History { product, variant } => {
            let repository = open_repository(&settings).await?;
            let observations = PriceService::new(repository)
                .history(&product, variant.as_deref())
                .await?;
            info!(product_key = %product, rows = observations.len(), "Price history loaded");
            for observation in &observations {
                println!("{}", serde_json::to_string(observation)?);
            }
        }
    }

    info!("pricetrackr finished");
    Ok(())
}

fn print_categories() {
    for (slug, name) in KNOWN_CATEGORIES {
        println!("{:<16} {}", slug, name);
    }
}

/// 收到 Ctrl-C 后触发取消令牌
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });
}

/// 连接数据库、执行迁移并创建价格仓库
async fn open_repository(settings: &Settings) -> anyhow::Result<Arc<dyn PriceRepository>> {
    let db = connection::connect_and_migrate(&settings.database)
        .await
        .context("failed to prepare database")?;
    info!("Database connection established");
    Ok(Arc::new(PriceRepositoryImpl::new(Arc::new(db))))
}

fn upstream_api(settings: &Settings) -> anyhow::Result<UpstreamApi> {
    UpstreamApi::new(&settings.scraper.api_base_url)
        .with_context(|| format!("invalid api base url {}", settings.scraper.api_base_url))
}

async fn open_fetcher(settings: &Settings) -> anyhow::Result<Arc<dyn Fetcher>> {
    let client = BrowserClient::connect(&settings.scraper)
        .await
        .context("failed to build HTTP client")?;
    Ok(Arc::new(client))
}

/// 按配置选择队列后端
async fn open_queue(settings: &Settings) -> anyhow::Result<Arc<dyn TaskQueue>> {
    let queue: Arc<dyn TaskQueue> = match settings.queue.backend {
        QueueBackend::Redis => Arc::new(
            RedisTaskQueue::connect(&settings.redis.url, &settings.queue)
                .await
                .context("failed to connect to queue broker")?,
        ),
        QueueBackend::Memory => Arc::new(MemoryTaskQueue::new()),
    };
    info!(backend = ?settings.queue.backend, queue = %settings.queue.name, "Task queue ready");
    Ok(queue)
}

fn queue_worker(
    settings: &Settings,
    queue: Arc<dyn TaskQueue>,
    fetcher: Arc<dyn Fetcher>,
    repository: Arc<dyn PriceRepository>,
) -> anyhow::Result<QueueWorker> {
    let handler = ScrapeWorker::new(fetcher, upstream_api(settings)?, PriceService::new(repository));
    Ok(QueueWorker::new(queue, &settings.queue.name, Arc::new(handler)))
}

fn hot_product_scheduler(
    settings: &Settings,
    queue: Arc<dyn TaskQueue>,
    repository: Arc<dyn PriceRepository>,
) -> HotProductScheduler {
    let scheduler = &settings.scheduler;
    let policy = StalenessPolicy::new(
        repository,
        chrono::Duration::minutes(scheduler.stale_after_mins),
        scheduler.priority_threshold,
        scheduler.batch_limit,
    );
    HotProductScheduler::new(
        Arc::new(policy),
        queue,
        &settings.queue.name,
        Duration::from_secs(scheduler.interval_secs),
    )
}

/// 并行运行多个工作器，任意一个出错时取消其余工作器并返回第一个错误
async fn run_workers(
    workers: Vec<Arc<dyn Worker>>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut set = JoinSet::new();
    for worker in workers {
        let cancel = cancel.clone();
        set.spawn(async move {
            let result = worker.run(cancel.clone()).await;
            if let Err(e) = &result {
                error!(worker = worker.name(), error = %e, "Worker stopped with error");
                cancel.cancel();
            }
            result
        });
    }

    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(e) => {
                cancel.cancel();
                Err(anyhow::anyhow!("worker task panicked: {}", e))
            }
        };
        if let Err(e) = outcome {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
