// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::category::Category;
use crate::domain::models::price::PriceObservation;
use crate::domain::models::product::{Product, ProductVariant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use std::sync::Arc;
use thiserror::Error;

/// 历史查询的最大返回行数
pub const HISTORY_LIMIT: u64 = 1000;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 其他存储错误
    #[error("Storage error: {0}")]
    Storage(String),
}

/// 待抓取商品查询条件
///
/// 满足以下任一条件的跟踪中且可售商品视为到期：
/// 从未抓取、最近抓取早于 `stale_before`、或优先级不低于 `min_priority`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueProductQuery {
    pub stale_before: DateTime<Utc>,
    pub min_priority: i32,
    pub limit: u64,
}

/// 价格仓库特质
///
/// 定义商品、变体、价格历史和分类的数据访问接口。
/// 所有写操作都是基于键的 upsert 或只追加插入，因此重复执行是安全的。
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// 详情抓取后创建或刷新商品（标题、可售状态、最近抓取时间）
    async fn upsert_product(&self, product: &Product) -> Result<(), RepositoryError>;

    /// 分类爬取发现商品后批量创建或刷新（标题、可售状态、分类、最近爬取时间）
    ///
    /// # 返回值
    ///
    /// * `Ok(u64)` - 写入的商品数量
    /// * `Err(RepositoryError)` - 整批写入失败
    async fn upsert_discovered_products(&self, products: &[Product])
        -> Result<u64, RepositoryError>;

    /// 创建或刷新变体
    async fn upsert_variants(&self, variants: &[ProductVariant]) -> Result<u64, RepositoryError>;

    /// 追加一条价格观测
    async fn insert_price_observation(
        &self,
        observation: &PriceObservation,
    ) -> Result<(), RepositoryError>;

    /// 查询商品的价格历史，按时间倒序
    async fn get_product_history(
        &self,
        product_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError>;

    /// 查询某个变体的价格历史，按时间倒序
    async fn get_product_history_by_variant(
        &self,
        product_key: &str,
        variant_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError>;

    /// 查询跟踪中且可售的商品，按优先级倒序
    async fn get_tracked_products(&self) -> Result<Vec<Product>, RepositoryError>;

    /// 查询满足跟踪条件的变体
    ///
    /// 变体可售，且所属商品跟踪中并可售；按商品优先级倒序
    async fn get_active_trackable_variants(&self) -> Result<Vec<ProductVariant>, RepositoryError>;

    /// 查询到期需要重新抓取的商品，结果确定且有上限，不修改任何状态
    async fn find_due_products(
        &self,
        query: &DueProductQuery,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// 创建或刷新分类
    async fn upsert_category(&self, category: &Category) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<T: PriceRepository + ?Sized> PriceRepository for Arc<T> {
    async fn upsert_product(&self, product: &Product) -> Result<(), RepositoryError> {
        (**self).upsert_product(product).await
    }

    async fn upsert_discovered_products(
        &self,
        products: &[Product],
    ) -> Result<u64, RepositoryError> {
        (**self).upsert_discovered_products(products).await
    }

    async fn upsert_variants(&self, variants: &[ProductVariant]) -> Result<u64, RepositoryError> {
        (**self).upsert_variants(variants).await
    }

    async fn insert_price_observation(
        &self,
        observation: &PriceObservation,
    ) -> Result<(), RepositoryError> {
        (**self).insert_price_observation(observation).await
    }

    async fn get_product_history(
        &self,
        product_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        (**self).get_product_history(product_key).await
    }

    async fn get_product_history_by_variant(
        &self,
        product_key: &str,
        variant_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        (**self)
            .get_product_history_by_variant(product_key, variant_key)
            .await
    }

    async fn get_tracked_products(&self) -> Result<Vec<Product>, RepositoryError> {
        (**self).get_tracked_products().await
    }

    async fn get_active_trackable_variants(&self) -> Result<Vec<ProductVariant>, RepositoryError> {
        (**self).get_active_trackable_variants().await
    }

    async fn find_due_products(
        &self,
        query: &DueProductQuery,
    ) -> Result<Vec<Product>, RepositoryError> {
        (**self).find_due_products(query).await
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), RepositoryError> {
        (**self).upsert_category(category).await
    }
}
