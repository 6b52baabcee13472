// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 抓取任务
///
/// 队列中传递的最小工作单元：一个商品，可选地指定一个变体。
/// 投递语义为至少一次，处理方必须保证幂等。
///
/// 线上格式为 `{"product_key": "...", "variant_key": "..."}`，
/// 同时兼容旧的 `dkp_id` / `variant_id` 字段名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrapeTask {
    #[serde(alias = "dkp_id")]
    pub product_key: String,
    #[serde(
        default,
        alias = "variant_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub variant_key: Option<String>,
}

impl ScrapeTask {
    /// 创建针对整个商品的任务
    pub fn product(product_key: impl Into<String>) -> Self {
        Self {
            product_key: product_key.into(),
            variant_key: None,
        }
    }

    /// 创建针对单个变体的任务
    pub fn variant(product_key: impl Into<String>, variant_key: impl Into<String>) -> Self {
        Self {
            product_key: product_key.into(),
            variant_key: Some(variant_key.into()),
        }
    }

    /// 编码为队列消息体
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 从队列消息体解码
    ///
    /// 商品键和变体键必须是非空的字母数字串，否则视为格式错误的消息
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let task: Self = serde_json::from_slice(payload)?;
        if !is_valid_key(&task.product_key) {
            return Err(invalid_key("product_key", &task.product_key));
        }
        if let Some(variant) = task.variant_key.as_deref() {
            if !is_valid_key(variant) {
                return Err(invalid_key("variant_key", variant));
            }
        }
        Ok(task)
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn invalid_key(field: &str, value: &str) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(format!("invalid {field}: {value:?}"))
}

impl fmt::Display for ScrapeTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.variant_key {
            Some(variant) => write!(f, "{}#{}", self.product_key, variant),
            None => write!(f, "{}", self.product_key),
        }
    }
}
