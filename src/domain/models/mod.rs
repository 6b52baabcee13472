// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了价格跟踪系统的核心业务实体，包括：
/// - 商品与变体（product）：被跟踪的商品及其可售配置
/// - 价格观测（price）：只追加的价格时间序列
/// - 分类（category）：批量爬取的分类及已知分类目录
/// - 抓取任务（scrape_task）：队列中传递的工作单元
pub mod category;
pub mod price;
pub mod product;
pub mod scrape_task;
