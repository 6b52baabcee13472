// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台任务处理功能
/// 包括抓取任务处理器和队列消费循环
pub mod scrape_worker;
pub mod worker;

pub use worker::Worker;
