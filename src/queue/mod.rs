// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供抓取任务队列和热门商品调度
/// 负责任务的发布、至少一次投递和周期性选择
pub mod memory_queue;
pub mod redis_queue;
pub mod scheduler;
pub mod task_queue;
