// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use pricetrackr::domain::models::scrape_task::ScrapeTask;
use pricetrackr::engines::traits::FetchError;
use pricetrackr::queue::memory_queue::MemoryTaskQueue;
use pricetrackr::queue::task_queue::{dispatch, Disposition, TaskHandler, TaskQueue};
use pricetrackr::utils::errors::WorkerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "scrape_tasks";

/// 记录调用并按预设次数失败的处理器
#[derive(Default)]
struct RecordingHandler {
    failures_left: Mutex<usize>,
    seen: Mutex<Vec<ScrapeTask>>,
}

impl RecordingHandler {
    fn failing(times: usize) -> Self {
        Self {
            failures_left: Mutex::new(times),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<ScrapeTask> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError> {
        self.seen.lock().push(task.clone());
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

fn spawn_consumer(
    queue: Arc<MemoryTaskQueue>,
    handler: Arc<RecordingHandler>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        queue
            .consume(QUEUE, handler.as_ref(), &cancel)
            .await
            .unwrap();
    })
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_malformed_payload_is_dropped_without_handler_call() {
    let queue = Arc::new(MemoryTaskQueue::new());
    queue.declare(QUEUE).await.unwrap();
    queue.publish_raw(QUEUE, b"{not json".to_vec());
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 1);

    let handler = Arc::new(RecordingHandler::default());
    let cancel = CancellationToken::new();
    let consumer = spawn_consumer(queue.clone(), handler.clone(), cancel.clone());

    let observed = queue.clone();
    wait_until(move || observed.stats(QUEUE).dropped == 1).await;
    cancel.cancel();
    consumer.await.unwrap();

    assert_eq!(queue.depth(QUEUE).await.unwrap(), 0);
    assert!(handler.seen().is_empty());
    assert_eq!(queue.stats(QUEUE).acked, 0);
}

#[tokio::test]
async fn test_failing_handler_gets_redelivery() {
    let queue = Arc::new(MemoryTaskQueue::new());
    queue.declare(QUEUE).await.unwrap();
    queue
        .publish(QUEUE, &ScrapeTask::variant("100", "7"))
        .await
        .unwrap();

    let handler = Arc::new(RecordingHandler::failing(2));
    let cancel = CancellationToken::new();
    let consumer = spawn_consumer(queue.clone(), handler.clone(), cancel.clone());

    let observed = queue.clone();
    wait_until(move || observed.stats(QUEUE).acked == 1).await;
    cancel.cancel();
    consumer.await.unwrap();

    let seen = handler.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|t| *t == ScrapeTask::variant("100", "7")));

    let stats = queue.stats(QUEUE);
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.acked, 1);
    assert!(queue.is_empty(QUEUE));
}

#[tokio::test]
async fn test_requeued_message_goes_to_back_of_line() {
    let queue = Arc::new(MemoryTaskQueue::new());
    queue.declare(QUEUE).await.unwrap();
    queue.publish(QUEUE, &ScrapeTask::product("1")).await.unwrap();
    queue.publish(QUEUE, &ScrapeTask::product("2")).await.unwrap();

    let handler = Arc::new(RecordingHandler::failing(1));
    let cancel = CancellationToken::new();
    let consumer = spawn_consumer(queue.clone(), handler.clone(), cancel.clone());

    let observed = queue.clone();
    wait_until(move || observed.stats(QUEUE).acked == 2).await;
    cancel.cancel();
    consumer.await.unwrap();

    let order: Vec<String> = handler
        .seen()
        .into_iter()
        .map(|t| t.product_key)
        .collect();
    assert_eq!(order, vec!["1", "2", "1"]);
}

/// 对指定商品永远返回404的处理器
struct DelistedHandler {
    delisted: &'static str,
    seen: Mutex<Vec<ScrapeTask>>,
}

#[async_trait]
impl TaskHandler for DelistedHandler {
    async fn handle(&self, task: &ScrapeTask) -> Result<(), WorkerError> {
        self.seen.lock().push(task.clone());
        if task.product_key == self.delisted {
            return Err(WorkerError::Fetch {
                product_key: task.product_key.clone(),
                source: FetchError::Status {
                    status: 404,
                    url: "http://upstream.test".to_string(),
                },
            });
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_always_failing_task_does_not_starve_queue() {
    let queue = Arc::new(MemoryTaskQueue::new());
    queue.declare(QUEUE).await.unwrap();
    queue.publish(QUEUE, &ScrapeTask::product("gone")).await.unwrap();
    for key in 0..5 {
        queue
            .publish(QUEUE, &ScrapeTask::product(key.to_string()))
            .await
            .unwrap();
    }

    let handler = Arc::new(DelistedHandler {
        delisted: "gone",
        seen: Mutex::new(Vec::new()),
    });
    let cancel = CancellationToken::new();
    let consumer = {
        let queue = queue.clone();
        let handler = handler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.consume(QUEUE, handler.as_ref(), &cancel).await })
    };

    let observed = queue.clone();
    wait_until(move || observed.stats(QUEUE).acked == 5).await;
    cancel.cancel();
    consumer.await.unwrap().unwrap();

    let seen = handler.seen.lock().clone();
    let healthy: Vec<&str> = seen
        .iter()
        .map(|t| t.product_key.as_str())
        .filter(|key| *key != "gone")
        .collect();
    assert_eq!(healthy, vec!["0", "1", "2", "3", "4"]);
    // The failing task is only retried once the healthy backlog has been served
    assert_eq!(seen[0].product_key, "gone");
    assert_eq!(seen[1].product_key, "0");

    // Still queued for redelivery
    assert_eq!(queue.depth(QUEUE).await.unwrap(), 1);
    assert!(queue.stats(QUEUE).requeued >= 1);
}

#[tokio::test]
async fn test_consume_returns_on_cancel_when_idle() {
    let queue = Arc::new(MemoryTaskQueue::new());
    let handler = Arc::new(RecordingHandler::default());
    let cancel = CancellationToken::new();
    let consumer = spawn_consumer(queue, handler, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("consumer did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_dispatch_dispositions() {
    let ok = RecordingHandler::default();
    let failing = RecordingHandler::failing(1);
    let payload = ScrapeTask::product("5").encode().unwrap();

    assert_eq!(dispatch(&payload, &ok).await, Disposition::Ack);
    assert_eq!(dispatch(&payload, &failing).await, Disposition::Requeue);
    assert_eq!(dispatch(b"[]", &ok).await, Disposition::Drop);
    assert_eq!(ok.seen().len(), 1);
}
