// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! Redis 后端测试，除连接失败用例外都需要 Docker：`cargo test -- --ignored`

use async_trait::async_trait;
use parking_lot::Mutex;
use pricetrackr::config::settings::{QueueBackend, QueueSettings};
use pricetrackr::domain::models::scrape_task::ScrapeTask;
use pricetrackr::engines::traits::FetchError;
use pricetrackr::queue::redis_queue::RedisTaskQueue;
use pricetrackr::queue::task_queue::{QueueError, TaskHandler, TaskQueue};
use pricetrackr::utils::errors::WorkerError;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "scrape_tasks";

struct Broker {
    url: String,
    _node: ContainerAsync<GenericImage>,
}

async fn start_broker() -> Broker {
    let node = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("failed to start redis container");
    let port = node
        .get_host_port_ipv4(6379)
        .await
        .expect("redis port not mapped");
    Broker {
        url: format!("redis://127.0.0.1:{}", port),
        _node: node,
    }
}

fn settings(consumer: &str) -> QueueSettings {
    QueueSettings {
        backend: QueueBackend::Redis,
        name: QUEUE.to_string(),
        consumer_name: consumer.to_string(),
        key_prefix: "test".to_string(),
        poll_interval_ms: 20,
        connect_retries: 3,
    }
}

#[derive(Default)]
struct FlakyHandler {
    failures_left: Mutex<usize>,
    handled: Mutex<Vec<ScrapeTask>>,
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError> {
        self.handled.lock().push(task.clone());
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            return Err(WorkerError::Fetch {
                product_key: task.product_key.clone(),
                source: FetchError::Status {
                    status: 503,
                    url: "http://upstream.test".to_string(),
                },
            });
        }
        Ok(())
    }
}

async fn consume_until(
    queue: &RedisTaskQueue,
    handler: Arc<FlakyHandler>,
    handled: usize,
) {
    let cancel = CancellationToken::new();
    let consumer = {
        let queue = queue.clone();
        let handler = handler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.consume(QUEUE, handler.as_ref(), &cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        while handler.handled.lock().len() < handled {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("messages not handled in time");

    cancel.cancel();
    consumer.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_failed_message_is_redelivered() {
    let broker = start_broker().await;
    let queue = RedisTaskQueue::connect(&broker.url, &settings("worker-a"))
        .await
        .unwrap();
    queue.declare(QUEUE).await.unwrap();
    queue
        .publish(QUEUE, &ScrapeTask::product("100"))
        .await
        .unwrap();
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 1);

    let handler = Arc::new(FlakyHandler {
        failures_left: Mutex::new(1),
        handled: Mutex::new(Vec::new()),
    });
    consume_until(&queue, handler.clone(), 2).await;

    assert_eq!(handler.handled.lock().len(), 2);
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 0);

    let client = redis::Client::open(broker.url.as_str()).unwrap();
    let mut connection = client.get_multiplexed_async_connection().await.unwrap();
    let in_flight: usize = connection.llen(queue.processing_key(QUEUE)).await.unwrap();
    assert_eq!(in_flight, 0);
}

#[tokio::test]
#[ignore]
async fn test_redis_requeued_message_goes_to_back_of_line() {
    let broker = start_broker().await;
    let queue = RedisTaskQueue::connect(&broker.url, &settings("worker-e"))
        .await
        .unwrap();
    queue.declare(QUEUE).await.unwrap();
    queue.publish(QUEUE, &ScrapeTask::product("1")).await.unwrap();
    queue.publish(QUEUE, &ScrapeTask::product("2")).await.unwrap();

    let handler = Arc::new(FlakyHandler {
        failures_left: Mutex::new(1),
        handled: Mutex::new(Vec::new()),
    });
    consume_until(&queue, handler.clone(), 3).await;

    let order: Vec<String> = handler
        .handled
        .lock()
        .iter()
        .map(|t| t.product_key.clone())
        .collect();
    assert_eq!(order, vec!["1", "2", "1"]);
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_redis_malformed_message_is_dropped() {
    let broker = start_broker().await;
    let queue = RedisTaskQueue::connect(&broker.url, &settings("worker-b"))
        .await
        .unwrap();
    queue.declare(QUEUE).await.unwrap();

    let client = redis::Client::open(broker.url.as_str()).unwrap();
    let mut connection = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = connection
        .lpush(queue.ready_key(QUEUE), "garbage")
        .await
        .unwrap();
    queue
        .publish(QUEUE, &ScrapeTask::product("7"))
        .await
        .unwrap();
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 2);

    let handler = Arc::new(FlakyHandler::default());
    consume_until(&queue, handler.clone(), 1).await;

    assert_eq!(*handler.handled.lock(), vec![ScrapeTask::product("7")]);
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_redis_stranded_messages_are_recovered() {
    let broker = start_broker().await;
    let queue = RedisTaskQueue::connect(&broker.url, &settings("worker-c"))
        .await
        .unwrap();

    // Simulate a crash after the message was moved to the processing list
    let client = redis::Client::open(broker.url.as_str()).unwrap();
    let mut connection = client.get_multiplexed_async_connection().await.unwrap();
    let payload = ScrapeTask::product("55").encode().unwrap();
    let _: () = connection
        .lpush(queue.processing_key(QUEUE), payload)
        .await
        .unwrap();

    let handler = Arc::new(FlakyHandler::default());
    consume_until(&queue, handler.clone(), 1).await;

    assert_eq!(*handler.handled.lock(), vec![ScrapeTask::product("55")]);
}

#[tokio::test]
async fn test_redis_connect_gives_up_after_retries() {
    let mut settings = settings("worker-d");
    settings.connect_retries = 1;
    match RedisTaskQueue::connect("redis://127.0.0.1:1", &settings).await {
        Err(QueueError::Connect { attempts, .. }) => assert_eq!(attempts, 1),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("connected to a closed port"),
    }
}
