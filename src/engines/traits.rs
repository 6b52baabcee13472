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

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 抓取错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    /// 连接、TLS、超时或读取响应体失败
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// 上游返回非2xx状态码（包括反爬拦截的403）
    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },
    /// URL无法解析
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// 获取HTTP状态码（仅 `Status` 变体）
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            FetchError::InvalidUrl(_) => None,
        }
    }

    /// 判断是否为上游拦截（403/429）
    pub fn is_blocked(&self) -> bool {
        matches!(self.status(), Some(403) | Some(429))
    }
}

/// 抓取客户端特质
///
/// 抓取流水线依赖的唯一HTTP接口：`get(url)` 返回响应体文本。
/// 实现不做内部重试，重试由队列的重新投递负责。
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 获取URL的响应体
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    ///
    /// # 返回值
    ///
    /// * `Ok(String)` - 2xx响应体
    /// * `Err(FetchError)` - 传输失败或非2xx状态
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        (**self).get(url).await
    }
}
