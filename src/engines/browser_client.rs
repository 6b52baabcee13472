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

use crate::config::settings::ScraperSettings;
use crate::engines::traits::{FetchError, Fetcher};
use async_trait::async_trait;
use metrics::counter;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// 桌面版 Chrome 120 的 User-Agent
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

/// API请求头，按浏览器发送顺序排列
const API_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en-US,en;q=0.9,fa;q=0.8"),
    ("accept-encoding", "gzip, deflate, br"),
    ("cache-control", "max-age=0"),
    (
        "sec-ch-ua",
        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    ("user-agent", CHROME_USER_AGENT),
];

/// 预热时访问首页使用的导航请求头
const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    ("user-agent", CHROME_USER_AGENT),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.9,fa;q=0.8"),
    ("accept-encoding", "gzip, deflate, br"),
    ("cache-control", "max-age=0"),
];

fn header_map(headers: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        map.append(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    map
}

/// 请求前随机等待的区间（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        if min_ms > max_ms {
            Self {
                min_ms: max_ms,
                max_ms: min_ms,
            }
        } else {
            Self { min_ms, max_ms }
        }
    }

    /// 区间为 [0, 0] 时不等待
    pub fn is_disabled(&self) -> bool {
        self.max_ms == 0
    }

    /// 在区间内随机取一个等待时长
    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::random_range(self.min_ms..=self.max_ms))
    }
}

/// 浏览器指纹抓取客户端
///
/// 模拟桌面浏览器访问上游接口：
/// - 固定的请求头集合与顺序
/// - 所有请求共享同一个 cookie 容器
/// - 创建时访问一次站点首页获取会话 cookie
/// - 每次请求前随机等待
/// - 自动跟随重定向并保留 cookie
#[derive(Clone)]
pub struct BrowserClient {
    client: reqwest::Client,
    cookies: Arc<Jar>,
    delay: DelayRange,
}

impl BrowserClient {
    /// 创建客户端并执行预热
    ///
    /// 预热失败只记录警告，不影响客户端创建。
    ///
    /// # 参数
    ///
    /// * `settings` - 抓取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(BrowserClient)` - 可用的客户端
    /// * `Err(FetchError)` - HTTP客户端构建失败
    pub async fn connect(settings: &ScraperSettings) -> Result<Self, FetchError> {
        let client = Self::build(settings)?;
        if settings.warmup {
            client
                .warm_up(
                    &settings.site_url,
                    Duration::from_millis(settings.warmup_pause_ms),
                )
                .await;
        }
        Ok(client)
    }

    /// 创建客户端但不预热
    pub fn build(settings: &ScraperSettings) -> Result<Self, FetchError> {
        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            cookies,
            delay: DelayRange::new(settings.min_delay_ms, settings.max_delay_ms),
        })
    }

    /// 共享的 cookie 容器
    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.cookies.clone()
    }

    /// 访问站点首页以建立会话 cookie
    async fn warm_up(&self, site_url: &str, pause: Duration) {
        let url = match Url::parse(site_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(site_url, error = %e, "Warm-up skipped: invalid site url");
                return;
            }
        };

        let result = self
            .client
            .get(url)
            .headers(header_map(NAVIGATION_HEADERS))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                // Drain the body so the connection can be reused
                let _ = response.bytes().await;
                info!(site_url, "Warm-up request succeeded");
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            Ok(response) => {
                warn!(
                    site_url,
                    status = response.status().as_u16(),
                    "Warm-up request returned non-success status"
                );
            }
            Err(e) => {
                warn!(site_url, error = %e, "Warm-up request failed");
            }
        }
    }
}

#[async_trait]
impl Fetcher for BrowserClient {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        if !self.delay.is_disabled() {
            tokio::time::sleep(self.delay.sample()).await;
        }

        let response = self
            .client
            .get(parsed)
            .headers(header_map(API_HEADERS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            counter!("pricetrackr_fetch_errors_total").increment(1);
            debug!(url, status = status.as_u16(), "Upstream returned non-success status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
#[path = "browser_client_test.rs"]
mod tests;
