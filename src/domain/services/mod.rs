// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 价格服务（price_service）：按引用顺序持久化商品、变体与价格观测
/// - 选择策略（selection_policy）：决定调度器每个周期重新抓取哪些商品
pub mod price_service;
pub mod selection_policy;
