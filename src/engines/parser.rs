// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 上游JSON响应解析
//!
//! 将分类搜索页和商品详情的响应体转换为领域记录。
//! 可选字段缺失时使用默认值，必需字段（`id`、标题）缺失时返回 `MissingField`。

use crate::domain::models::price::PriceObservation;
use crate::domain::models::product::{
    is_marketable, Product, ProductSnapshot, ProductVariant, DEFAULT_CRAWL_PRIORITY,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// 解析错误类型
#[derive(Error, Debug)]
pub enum ParseError {
    /// 响应体不是合法的JSON或结构不符
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// 必需字段缺失
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    /// 响应信封中的状态码不是200
    #[error("Upstream reported status {0}")]
    UnexpectedStatus(i64),
}

/// 上游ID，可能是数字也可能是字符串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_key(self) -> Option<String> {
        match self {
            RawId::Number(n) => Some(n.to_string()),
            RawId::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

/// 本地化文本，可能是字符串也可能是 `{"fa": "..."}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocalizedText {
    Plain(String),
    Localized {
        #[serde(default)]
        fa: Option<String>,
        #[serde(default)]
        en: Option<String>,
    },
}

impl LocalizedText {
    fn into_text(self) -> String {
        match self {
            LocalizedText::Plain(s) => s,
            LocalizedText::Localized { fa, en } => fa.or(en).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<i64>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ParseError> {
        if let Some(status) = self.status {
            if status != 200 {
                return Err(ParseError::UnexpectedStatus(status));
            }
        }
        self.data.ok_or(ParseError::MissingField("data"))
    }
}

#[derive(Debug, Deserialize)]
struct CategoryData {
    #[serde(default)]
    products: Vec<ProductRecord>,
    #[serde(default)]
    pager: Option<Pager>,
}

#[derive(Debug, Deserialize)]
struct Pager {
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: Option<RawId>,
    #[serde(default)]
    title_fa: Option<String>,
    #[serde(default)]
    title_en: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ProductRecord {
    fn key(&mut self) -> Result<String, ParseError> {
        self.id
            .take()
            .and_then(RawId::into_key)
            .ok_or(ParseError::MissingField("id"))
    }

    fn title(&mut self) -> Result<String, ParseError> {
        [self.title_fa.take(), self.title_en.take()]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .ok_or(ParseError::MissingField("title"))
    }

    fn is_active(&self) -> bool {
        self.status.as_deref().is_some_and(is_marketable)
    }
}

#[derive(Debug, Deserialize)]
struct DetailData {
    product: Option<DetailProduct>,
}

#[derive(Debug, Deserialize)]
struct DetailProduct {
    #[serde(flatten)]
    record: ProductRecord,
    /// 没有默认变体时上游可能返回空数组
    #[serde(default)]
    default_variant: Option<Value>,
    #[serde(default)]
    variants: Vec<VariantRecord>,
}

#[derive(Debug, Deserialize)]
struct VariantRecord {
    id: Option<RawId>,
    #[serde(default)]
    title_fa: Option<LocalizedText>,
    #[serde(default)]
    color: Option<Attribute>,
    #[serde(default)]
    storage: Option<Attribute>,
    #[serde(default)]
    seller: Option<Seller>,
    #[serde(default)]
    price: Option<Price>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    #[serde(default)]
    title_fa: Option<LocalizedText>,
    #[serde(default)]
    title: Option<LocalizedText>,
}

impl Attribute {
    fn into_text(self) -> String {
        self.title_fa
            .or(self.title)
            .map(LocalizedText::into_text)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Seller {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    title: Option<String>,
}

impl Seller {
    /// 优先使用非零的卖家ID，否则使用卖家名称
    fn into_key(self) -> String {
        self.id
            .and_then(RawId::into_key)
            .filter(|id| id != "0")
            .or(self.title.filter(|t| !t.is_empty()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(default)]
    selling_price: Option<i64>,
    #[serde(default)]
    rrp_price: Option<i64>,
}

impl Price {
    fn effective(&self) -> i64 {
        match self.selling_price {
            Some(price) if price > 0 => price,
            _ => self.rrp_price.unwrap_or(0),
        }
    }
}

fn default_variant_key(value: Option<&Value>) -> Option<String> {
    match value?.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// 解析分类搜索页
///
/// # 参数
///
/// * `body` - 响应体
/// * `category` - 分类slug，写入发现的商品
/// * `now` - 发现时间
///
/// # 返回值
///
/// * `Ok((Vec<Product>, u32))` - 本页商品和总页数（缺失或为0时按1页处理）
/// * `Err(ParseError)` - 解析失败
pub fn parse_category_page(
    body: &str,
    category: &str,
    now: DateTime<Utc>,
) -> Result<(Vec<Product>, u32), ParseError> {
    let envelope: Envelope<CategoryData> = serde_json::from_str(body)?;
    let data = envelope.into_data()?;

    let total_pages = data
        .pager
        .and_then(|p| p.total_pages)
        .filter(|&n| n > 0)
        .unwrap_or(1);

    let products = data
        .products
        .into_iter()
        .map(|mut record| -> Result<Product, ParseError> {
            let mut product = Product::new(record.key()?, record.title()?, record.is_active());
            product.category = category.to_string();
            product.crawl_priority = DEFAULT_CRAWL_PRIORITY;
            product.is_tracked = true;
            product.last_crawled = Some(now);
            Ok(product)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((products, total_pages))
}

/// 解析商品详情
///
/// 变体全部返回（用于同步可售状态），价格观测只为可售变体生成。
pub fn parse_product_detail(
    body: &str,
    product_key: &str,
    now: DateTime<Utc>,
) -> Result<ProductSnapshot, ParseError> {
    let envelope: Envelope<DetailData> = serde_json::from_str(body)?;
    let mut detail = envelope
        .into_data()?
        .product
        .ok_or(ParseError::MissingField("product"))?;

    // The id must be present even though the requested key is authoritative
    detail.record.key()?;
    let title = detail.record.title()?;

    let mut product = Product::new(product_key, title, detail.record.is_active());
    product.last_scraped_at = Some(now);

    let buy_box = default_variant_key(detail.default_variant.as_ref());

    let mut variants = Vec::with_capacity(detail.variants.len());
    let mut observations = Vec::new();
    for record in detail.variants {
        let Some(variant_key) = record.id.and_then(RawId::into_key) else {
            continue;
        };
        let is_active = record.status.as_deref().is_some_and(is_marketable);

        if is_active {
            observations.push(PriceObservation {
                time: now,
                product_key: product_key.to_string(),
                variant_key: variant_key.clone(),
                price: record.price.as_ref().map(Price::effective).unwrap_or(0),
                seller_key: record.seller.map(Seller::into_key).unwrap_or_default(),
                is_buy_box: buy_box.as_deref().is_none_or(|key| key == variant_key),
            });
        }

        variants.push(ProductVariant {
            variant_key,
            product_key: product_key.to_string(),
            variant_title: record
                .title_fa
                .map(LocalizedText::into_text)
                .unwrap_or_default(),
            color: record.color.map(Attribute::into_text).unwrap_or_default(),
            storage: record.storage.map(Attribute::into_text).unwrap_or_default(),
            is_active,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(ProductSnapshot {
        product,
        variants,
        observations,
    })
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
