// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::price::PriceObservation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 上游的可售状态标记
///
/// 只有与该值完全相等（区分大小写）的状态才被视为可售
pub const MARKETABLE_STATUS: &str = "marketable";

/// 新发现商品的默认抓取优先级
pub const DEFAULT_CRAWL_PRIORITY: i32 = 5;

/// 判断上游状态是否为可售
///
/// 精确匹配，不做前缀、子串或大小写归一化处理
pub fn is_marketable(status: &str) -> bool {
    status == MARKETABLE_STATUS
}

/// 商品实体
///
/// 商品由上游的稳定ID（`product_key`）唯一标识。流水线从不删除商品，
/// 下架只通过将 `is_active` 置为 false 来表示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// 上游商品ID
    pub product_key: String,
    /// 商品标题
    pub title: String,
    /// 上游是否可售
    pub is_active: bool,
    /// 所属分类slug，单品抓取时可能为空
    pub category: String,
    /// 抓取优先级，数值越大越先抓取
    pub crawl_priority: i32,
    /// 是否参与价格跟踪
    pub is_tracked: bool,
    /// 最近一次被分类爬取发现的时间
    pub last_crawled: Option<DateTime<Utc>>,
    /// 最近一次详情抓取成功的时间
    pub last_scraped_at: Option<DateTime<Utc>>,
}

impl Product {
    /// 创建一个带默认跟踪属性的商品
    pub fn new(product_key: impl Into<String>, title: impl Into<String>, is_active: bool) -> Self {
        Self {
            product_key: product_key.into(),
            title: title.into(),
            is_active,
            category: String::new(),
            crawl_priority: DEFAULT_CRAWL_PRIORITY,
            is_tracked: true,
            last_crawled: None,
            last_scraped_at: None,
        }
    }

    /// 商品当前是否可被价格跟踪
    pub fn is_trackable(&self) -> bool {
        self.is_tracked && self.is_active
    }
}

/// 商品变体实体
///
/// 变体是商品的一个可售配置（颜色、存储容量等组合），
/// 其活跃状态反映上游可售状态，每次变体抓取时重新同步。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    /// 上游变体ID
    pub variant_key: String,
    /// 所属商品ID
    pub product_key: String,
    pub variant_title: String,
    pub color: String,
    pub storage: String,
    /// 上游是否可售
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    /// 变体是否满足价格跟踪条件
    ///
    /// 需要变体可售，且所属商品同时处于跟踪中和可售状态
    pub fn is_trackable_with(&self, product: &Product) -> bool {
        self.is_active && product.is_trackable()
    }
}

/// 一次商品详情抓取的解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
    /// 仅包含可售变体的价格观测
    pub observations: Vec<PriceObservation>,
}
