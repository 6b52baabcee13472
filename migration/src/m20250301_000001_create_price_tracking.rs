// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Products::ProductKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Products::Title).text().not_null().default(""))
                    .col(ColumnDef::new(Products::IsActive).boolean().not_null().default(false))
                    .col(ColumnDef::new(Products::Category).string().not_null().default(""))
                    .col(ColumnDef::new(Products::CrawlPriority).integer().not_null().default(5))
                    .col(ColumnDef::new(Products::IsTracked).boolean().not_null().default(true))
                    .col(ColumnDef::new(Products::LastCrawled).timestamp_with_time_zone())
                    .col(ColumnDef::new(Products::LastScrapedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_due")
                    .table(Products::Table)
                    .col(Products::IsTracked)
                    .col(Products::IsActive)
                    .col(Products::CrawlPriority)
                    .col(Products::LastScrapedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductVariants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductVariants::VariantKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductVariants::ProductKey).string().not_null())
                    .col(ColumnDef::new(ProductVariants::VariantTitle).text().not_null().default(""))
                    .col(ColumnDef::new(ProductVariants::Color).string().not_null().default(""))
                    .col(ColumnDef::new(ProductVariants::Storage).string().not_null().default(""))
                    .col(ColumnDef::new(ProductVariants::IsActive).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(ProductVariants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProductVariants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_variants_product")
                            .from(ProductVariants::Table, ProductVariants::ProductKey)
                            .to(Products::Table, Products::ProductKey)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_variants_product")
                    .table(ProductVariants::Table)
                    .col(ProductVariants::ProductKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PriceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PriceHistory::Time).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(PriceHistory::ProductKey).string().not_null())
                    .col(ColumnDef::new(PriceHistory::VariantKey).string().not_null())
                    .col(ColumnDef::new(PriceHistory::Price).big_integer().not_null())
                    .col(ColumnDef::new(PriceHistory::SellerKey).string().not_null().default(""))
                    .col(ColumnDef::new(PriceHistory::IsBuyBox).boolean().not_null().default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_price_history_product")
                            .from(PriceHistory::Table, PriceHistory::ProductKey)
                            .to(Products::Table, Products::ProductKey)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_price_history_product_time")
                    .table(PriceHistory::Table)
                    .col(PriceHistory::ProductKey)
                    .col(PriceHistory::Time)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::CategorySlug)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::CategoryName).string().not_null())
                    .col(ColumnDef::new(Categories::CategoryUrl).string().not_null())
                    .col(ColumnDef::new(Categories::LastCrawled).timestamp_with_time_zone())
                    .col(ColumnDef::new(Categories::ProductCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Categories::IsActive).boolean().not_null().default(true))
                    .col(
                        ColumnDef::new(Categories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PriceHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    ProductKey,
    Title,
    IsActive,
    Category,
    CrawlPriority,
    IsTracked,
    LastCrawled,
    LastScrapedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductVariants {
    Table,
    VariantKey,
    ProductKey,
    VariantTitle,
    Color,
    Storage,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PriceHistory {
    Table,
    Id,
    Time,
    ProductKey,
    VariantKey,
    Price,
    SellerKey,
    IsBuyBox,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    CategorySlug,
    CategoryName,
    CategoryUrl,
    LastCrawled,
    ProductCount,
    IsActive,
    UpdatedAt,
}
