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

use crate::domain::models::category::Category;
use crate::domain::models::price::PriceObservation;
use crate::domain::models::product::{Product, ProductVariant};
use crate::domain::repositories::price_repository::{
    DueProductQuery, PriceRepository, RepositoryError, HISTORY_LIMIT,
};
use crate::infrastructure::database::entities::{
    category as category_entity, price_history as price_entity, product as product_entity,
    product_variant as variant_entity,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{NullOrdering, OnConflict},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, NotSet, Order, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;
use std::sync::Arc;

fn to_db(time: DateTime<Utc>) -> DateTime<FixedOffset> {
    time.into()
}

fn from_db(time: DateTime<FixedOffset>) -> DateTime<Utc> {
    time.with_timezone(&Utc)
}

impl From<product_entity::Model> for Product {
    fn from(model: product_entity::Model) -> Self {
        Self {
            product_key: model.product_key,
            title: model.title,
            is_active: model.is_active,
            category: model.category,
            crawl_priority: model.crawl_priority,
            is_tracked: model.is_tracked,
            last_crawled: model.last_crawled.map(from_db),
            last_scraped_at: model.last_scraped_at.map(from_db),
        }
    }
}

impl From<variant_entity::Model> for ProductVariant {
    fn from(model: variant_entity::Model) -> Self {
        Self {
            variant_key: model.variant_key,
            product_key: model.product_key,
            variant_title: model.variant_title,
            color: model.color,
            storage: model.storage,
            is_active: model.is_active,
            created_at: from_db(model.created_at),
            updated_at: from_db(model.updated_at),
        }
    }
}

impl From<price_entity::Model> for PriceObservation {
    fn from(model: price_entity::Model) -> Self {
        Self {
            time: from_db(model.time),
            product_key: model.product_key,
            variant_key: model.variant_key,
            price: model.price,
            seller_key: model.seller_key,
            is_buy_box: model.is_buy_box,
        }
    }
}

fn product_active_model(product: &Product, now: DateTime<Utc>) -> product_entity::ActiveModel {
    product_entity::ActiveModel {
        product_key: Set(product.product_key.clone()),
        title: Set(product.title.clone()),
        is_active: Set(product.is_active),
        category: Set(product.category.clone()),
        crawl_priority: Set(product.crawl_priority),
        is_tracked: Set(product.is_tracked),
        last_crawled: Set(product.last_crawled.map(to_db)),
        last_scraped_at: Set(product.last_scraped_at.map(to_db)),
        created_at: Set(to_db(now)),
        updated_at: Set(to_db(now)),
    }
}

/// 价格仓库实现
///
/// 基于SeaORM实现的商品、变体、价格历史和分类数据访问层
#[derive(Clone)]
pub struct PriceRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl PriceRepositoryImpl {
    /// 创建新的价格仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PriceRepository for PriceRepositoryImpl {
    async fn upsert_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut update = vec![
            product_entity::Column::Title,
            product_entity::Column::IsActive,
            product_entity::Column::LastScrapedAt,
            product_entity::Column::UpdatedAt,
        ];
        // A detail scrape does not know the category, keep the discovered one
        if !product.category.is_empty() {
            update.push(product_entity::Column::Category);
        }

        product_entity::Entity::insert(product_active_model(product, Utc::now()))
            .on_conflict(
                OnConflict::column(product_entity::Column::ProductKey)
                    .update_columns(update)
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn upsert_discovered_products(
        &self,
        products: &[Product],
    ) -> Result<u64, RepositoryError> {
        if products.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let models = products.iter().map(|p| product_active_model(p, now));
        let rows = product_entity::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(product_entity::Column::ProductKey)
                    .update_columns([
                        product_entity::Column::Title,
                        product_entity::Column::IsActive,
                        product_entity::Column::Category,
                        product_entity::Column::LastCrawled,
                        product_entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    async fn upsert_variants(&self, variants: &[ProductVariant]) -> Result<u64, RepositoryError> {
        if variants.is_empty() {
            return Ok(0);
        }

        let models = variants.iter().map(|v| variant_entity::ActiveModel {
            variant_key: Set(v.variant_key.clone()),
            product_key: Set(v.product_key.clone()),
            variant_title: Set(v.variant_title.clone()),
            color: Set(v.color.clone()),
            storage: Set(v.storage.clone()),
            is_active: Set(v.is_active),
            created_at: Set(to_db(v.created_at)),
            updated_at: Set(to_db(v.updated_at)),
        });

        let rows = variant_entity::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(variant_entity::Column::VariantKey)
                    .update_columns([
                        variant_entity::Column::VariantTitle,
                        variant_entity::Column::Color,
                        variant_entity::Column::Storage,
                        variant_entity::Column::IsActive,
                        variant_entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    async fn insert_price_observation(
        &self,
        observation: &PriceObservation,
    ) -> Result<(), RepositoryError> {
        let model = price_entity::ActiveModel {
            id: NotSet,
            time: Set(to_db(observation.time)),
            product_key: Set(observation.product_key.clone()),
            variant_key: Set(observation.variant_key.clone()),
            price: Set(observation.price),
            seller_key: Set(observation.seller_key.clone()),
            is_buy_box: Set(observation.is_buy_box),
        };
        price_entity::Entity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn get_product_history(
        &self,
        product_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        let rows = price_entity::Entity::find()
            .filter(price_entity::Column::ProductKey.eq(product_key))
            .order_by_desc(price_entity::Column::Time)
            .limit(HISTORY_LIMIT)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_product_history_by_variant(
        &self,
        product_key: &str,
        variant_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        let rows = price_entity::Entity::find()
            .filter(price_entity::Column::ProductKey.eq(product_key))
            .filter(price_entity::Column::VariantKey.eq(variant_key))
            .order_by_desc(price_entity::Column::Time)
            .limit(HISTORY_LIMIT)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_tracked_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = product_entity::Entity::find()
            .filter(product_entity::Column::IsTracked.eq(true))
            .filter(product_entity::Column::IsActive.eq(true))
            .order_by_desc(product_entity::Column::CrawlPriority)
            .order_by_asc(product_entity::Column::ProductKey)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_active_trackable_variants(&self) -> Result<Vec<ProductVariant>, RepositoryError> {
        let products = self.get_tracked_products().await?;
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let rank: HashMap<String, usize> = products
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p.product_key, i))
            .collect();

        let rows = variant_entity::Entity::find()
            .filter(variant_entity::Column::IsActive.eq(true))
            .filter(variant_entity::Column::ProductKey.is_in(rank.keys().cloned()))
            .order_by_asc(variant_entity::Column::VariantKey)
            .all(self.db.as_ref())
            .await?;

        let mut variants: Vec<ProductVariant> = rows.into_iter().map(Into::into).collect();
        variants.sort_by_key(|v| rank.get(&v.product_key).copied().unwrap_or(usize::MAX));
        Ok(variants)
    }

    async fn find_due_products(
        &self,
        query: &DueProductQuery,
    ) -> Result<Vec<Product>, RepositoryError> {
        let due = Condition::any()
            .add(product_entity::Column::LastScrapedAt.is_null())
            .add(product_entity::Column::LastScrapedAt.lt(to_db(query.stale_before)))
            .add(product_entity::Column::CrawlPriority.gte(query.min_priority));

        let rows = product_entity::Entity::find()
            .filter(product_entity::Column::IsTracked.eq(true))
            .filter(product_entity::Column::IsActive.eq(true))
            .filter(due)
            .order_by_desc(product_entity::Column::CrawlPriority)
            .order_by_with_nulls(
                product_entity::Column::LastScrapedAt,
                Order::Asc,
                NullOrdering::First,
            )
            .order_by_asc(product_entity::Column::ProductKey)
            .limit(query.limit)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), RepositoryError> {
        let model = category_entity::ActiveModel {
            category_slug: Set(category.category_slug.clone()),
            category_name: Set(category.category_name.clone()),
            category_url: Set(category.category_url.clone()),
            last_crawled: Set(category.last_crawled.map(to_db)),
            product_count: Set(category.product_count),
            is_active: Set(category.is_active),
            updated_at: Set(to_db(Utc::now())),
        };

        category_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(category_entity::Column::CategorySlug)
                    .update_columns([
                        category_entity::Column::LastCrawled,
                        category_entity::Column::ProductCount,
                        category_entity::Column::IsActive,
                        category_entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}
