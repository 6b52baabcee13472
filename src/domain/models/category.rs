// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 分类实体
///
/// 每次批量分类爬取结束后更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_slug: String,
    pub category_name: String,
    pub category_url: String,
    pub last_crawled: Option<DateTime<Utc>>,
    /// 最近一次爬取得到的商品数量
    pub product_count: i32,
    pub is_active: bool,
}

/// 已知分类目录 (slug, 显示名称)
pub const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("mobile-phone", "گوشی موبایل"),
    ("tablet", "تبلت"),
    ("laptop", "لپ‌تاپ"),
    ("smart-watch", "ساعت هوشمند"),
    ("headphone", "هدفون"),
    ("keyboard-mouse", "کیبورد و ماوس"),
    ("monitor", "مانیتور"),
    ("console-gaming", "کنسول بازی"),
    ("camera", "دوربین"),
    ("speaker", "اسپیکر"),
];

/// 按slug查找分类显示名称
pub fn category_name(slug: &str) -> Option<&'static str> {
    KNOWN_CATEGORIES
        .iter()
        .find(|(known, _)| *known == slug)
        .map(|(_, name)| *name)
}

impl Category {
    /// 根据一次爬取的结果构建分类记录
    ///
    /// # 参数
    ///
    /// * `slug` - 分类slug
    /// * `site_url` - 站点根地址，用于拼接分类页面URL
    /// * `product_count` - 本次爬取得到的商品数
    /// * `crawled_at` - 爬取完成时间
    pub fn from_crawl(
        slug: &str,
        site_url: &str,
        product_count: usize,
        crawled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            category_slug: slug.to_string(),
            category_name: category_name(slug).unwrap_or(slug).to_string(),
            category_url: format!(
                "{}/search/category-{}/",
                site_url.trim_end_matches('/'),
                slug
            ),
            last_crawled: Some(crawled_at),
            product_count: i32::try_from(product_count).unwrap_or(i32::MAX),
            is_active: true,
        }
    }
}
