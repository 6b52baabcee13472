// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 定义领域层的持久化抽象契约，具体实现由基础设施层提供。
/// 流水线只依赖这些接口，从而可以在测试中替换为内存实现。
pub mod price_repository;
