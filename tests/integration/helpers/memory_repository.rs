// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use pricetrackr::domain::models::category::Category;
use pricetrackr::domain::models::price::PriceObservation;
use pricetrackr::domain::models::product::{Product, ProductVariant};
use pricetrackr::domain::repositories::price_repository::{
    DueProductQuery, PriceRepository, RepositoryError, HISTORY_LIMIT,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Tables {
    products: BTreeMap<String, Product>,
    variants: BTreeMap<String, ProductVariant>,
    history: Vec<PriceObservation>,
    categories: BTreeMap<String, Category>,
}

/// 与 Postgres 实现具有相同 upsert 和外键语义的内存仓库
#[derive(Default)]
pub struct InMemoryPriceRepository {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryPriceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续所有写操作失败
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert_product(&self, product: Product) {
        self.tables
            .lock()
            .products
            .insert(product.product_key.clone(), product);
    }

    pub fn product(&self, key: &str) -> Option<Product> {
        self.tables.lock().products.get(key).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.tables.lock().products.len()
    }

    pub fn variant(&self, key: &str) -> Option<ProductVariant> {
        self.tables.lock().variants.get(key).cloned()
    }

    pub fn variant_count(&self) -> usize {
        self.tables.lock().variants.len()
    }

    pub fn observations(&self) -> Vec<PriceObservation> {
        self.tables.lock().history.clone()
    }

    pub fn category(&self, slug: &str) -> Option<Category> {
        self.tables.lock().categories.get(slug).cloned()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("write rejected".to_string()));
        }
        Ok(())
    }

    fn sorted_tracked(products: &BTreeMap<String, Product>) -> Vec<Product> {
        let mut tracked: Vec<Product> = products
            .values()
            .filter(|p| p.is_trackable())
            .cloned()
            .collect();
        tracked.sort_by_key(|p| (Reverse(p.crawl_priority), p.product_key.clone()));
        tracked
    }

    fn history_where(&self, keep: impl Fn(&PriceObservation) -> bool) -> Vec<PriceObservation> {
        let mut rows: Vec<PriceObservation> = self
            .tables
            .lock()
            .history
            .iter()
            .filter(|o| keep(o))
            .cloned()
            .collect();
        rows.sort_by_key(|o| Reverse(o.time));
        rows.truncate(HISTORY_LIMIT as usize);
        rows
    }
}

#[async_trait]
impl PriceRepository for InMemoryPriceRepository {
    async fn upsert_product(&self, product: &Product) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        match tables.products.get_mut(&product.product_key) {
            Some(existing) => {
                existing.title = product.title.clone();
                existing.is_active = product.is_active;
                existing.last_scraped_at = product.last_scraped_at;
                if !product.category.is_empty() {
                    existing.category = product.category.clone();
                }
            }
            None => {
                tables
                    .products
                    .insert(product.product_key.clone(), product.clone());
            }
        }
        Ok(())
    }

    async fn upsert_discovered_products(
        &self,
        products: &[Product],
    ) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        for product in products {
            match tables.products.get_mut(&product.product_key) {
                Some(existing) => {
                    existing.title = product.title.clone();
                    existing.is_active = product.is_active;
                    existing.category = product.category.clone();
                    existing.last_crawled = product.last_crawled;
                }
                None => {
                    tables
                        .products
                        .insert(product.product_key.clone(), product.clone());
                }
            }
        }
        Ok(products.len() as u64)
    }

    async fn upsert_variants(&self, variants: &[ProductVariant]) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        for variant in variants {
            if !tables.products.contains_key(&variant.product_key) {
                return Err(RepositoryError::Storage(format!(
                    "variant {} references missing product {}",
                    variant.variant_key, variant.product_key
                )));
            }
        }
        for variant in variants {
            match tables.variants.get_mut(&variant.variant_key) {
                Some(existing) => {
                    existing.variant_title = variant.variant_title.clone();
                    existing.color = variant.color.clone();
                    existing.storage = variant.storage.clone();
                    existing.is_active = variant.is_active;
                    existing.updated_at = variant.updated_at;
                }
                None => {
                    tables
                        .variants
                        .insert(variant.variant_key.clone(), variant.clone());
                }
            }
        }
        Ok(variants.len() as u64)
    }

    async fn insert_price_observation(
        &self,
        observation: &PriceObservation,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        if !tables.products.contains_key(&observation.product_key) {
            return Err(RepositoryError::Storage(format!(
                "observation references missing product {}",
                observation.product_key
            )));
        }
        tables.history.push(observation.clone());
        Ok(())
    }

    async fn get_product_history(
        &self,
        product_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        Ok(self.history_where(|o| o.product_key == product_key))
    }

    async fn get_product_history_by_variant(
        &self,
        product_key: &str,
        variant_key: &str,
    ) -> Result<Vec<PriceObservation>, RepositoryError> {
        Ok(self.history_where(|o| o.product_key == product_key && o.variant_key == variant_key))
    }

    async fn get_tracked_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(Self::sorted_tracked(&self.tables.lock().products))
    }

    async fn get_active_trackable_variants(&self) -> Result<Vec<ProductVariant>, RepositoryError> {
        let tables = self.tables.lock();
        let tracked = Self::sorted_tracked(&tables.products);
        let mut variants = Vec::new();
        for product in &tracked {
            variants.extend(
                tables
                    .variants
                    .values()
                    .filter(|v| v.product_key == product.product_key && v.is_trackable_with(product))
                    .cloned(),
            );
        }
        Ok(variants)
    }

    async fn find_due_products(
        &self,
        query: &DueProductQuery,
    ) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.lock();
        let mut due: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.is_trackable())
            .filter(|p| match p.last_scraped_at {
                None => true,
                Some(at) => at < query.stale_before || p.crawl_priority >= query.min_priority,
            })
            .cloned()
            .collect();
        due.sort_by_key(|p| {
            (
                Reverse(p.crawl_priority),
                p.last_scraped_at.is_some(),
                p.last_scraped_at,
                p.product_key.clone(),
            )
        });
        due.truncate(query.limit as usize);
        Ok(due)
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.tables
            .lock()
            .categories
            .insert(category.category_slug.clone(), category.clone());
        Ok(())
    }
}
