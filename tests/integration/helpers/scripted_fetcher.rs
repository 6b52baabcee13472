// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use pricetrackr::engines::traits::{FetchError, Fetcher};
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Clone)]
enum Reply {
    Body(String),
    Status(u16),
}

/// 按URL返回预设响应的抓取客户端
///
/// 未登记的URL返回404，所有请求连同发出时刻按顺序记录
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, body: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .insert(url.into(), Reply::Body(body.into()));
        self
    }

    pub fn fail_with(&self, url: impl Into<String>, status: u16) -> &Self {
        self.replies.lock().insert(url.into(), Reply::Status(status));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    /// 各请求的发出时刻，与 `requests` 顺序一致
    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().push((url.to_string(), Instant::now()));
        let reply = self.replies.lock().get(url).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}
