// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::price_repository::RepositoryError;
use crate::engines::parser::ParseError;
use crate::engines::traits::FetchError;
use std::fmt;
use thiserror::Error;

/// 任务处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker错误类型
///
/// 每个变体都携带失败阶段，便于日志中定位
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("fetch failed for {product_key}: {source}")]
    Fetch {
        product_key: String,
        #[source]
        source: FetchError,
    },

    #[error("parse failed for {product_key}: {source}")]
    Parse {
        product_key: String,
        #[source]
        source: ParseError,
    },

    #[error("persist failed for {product_key}: {source}")]
    Persist {
        product_key: String,
        #[source]
        source: RepositoryError,
    },
}

impl WorkerError {
    pub fn stage(&self) -> Stage {
        match self {
            WorkerError::Fetch { .. } => Stage::Fetch,
            WorkerError::Parse { .. } => Stage::Parse,
            WorkerError::Persist { .. } => Stage::Persist,
        }
    }

    pub fn product_key(&self) -> &str {
        match self {
            WorkerError::Fetch { product_key, .. }
            | WorkerError::Parse { product_key, .. }
            | WorkerError::Persist { product_key, .. } => product_key,
        }
    }

    /// 是否值得通过重新投递重试
    ///
    /// 解析失败说明上游返回了意外内容，重试也不会成功
    pub fn is_transient(&self) -> bool {
        !matches!(self, WorkerError::Parse { .. })
    }
}
