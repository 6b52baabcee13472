// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod bulk_crawl_test;
pub mod redis_queue_test;
pub mod task_queue_test;
