// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 价格观测记录
///
/// 只追加的事实记录：每个观测到的价格点一行，从不更新或删除。
/// 价格以最小货币单位的整数保存，允许为0。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// 观测时间
    pub time: DateTime<Utc>,
    pub product_key: String,
    pub variant_key: String,
    /// 价格（最小货币单位）
    pub price: i64,
    /// 卖家标识
    pub seller_key: String,
    /// 是否为购物车默认报价
    pub is_buy_box: bool,
}
