// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::Url;

/// 分类搜索接口的排序参数（按最新）
pub const CATEGORY_SORT: u32 = 22;

/// 上游JSON接口地址构造器
///
/// 路径段和查询参数都经过转义，键中的 `/`、`&` 不会改变请求的接口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamApi {
    base: Url,
}

impl UpstreamApi {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self { base })
    }

    /// 在基础地址后追加路径段，末尾保留 `/`
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base always has a hierarchical path
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    /// 分类搜索页地址，页码从1开始
    pub fn category_search_url(&self, slug: &str, page: u32) -> String {
        let mut url = self.endpoint(&["v1", "categories", slug, "search"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("sort", &CATEGORY_SORT.to_string());
        url.into()
    }

    /// 商品详情地址，指定变体时附加 `variant_id` 参数
    pub fn product_detail_url(&self, product_key: &str, variant_key: Option<&str>) -> String {
        let mut url = self.endpoint(&["v2", "product", product_key]);
        if let Some(variant) = variant_key {
            url.query_pairs_mut().append_pair("variant_id", variant);
        }
        url.into()
    }
}
