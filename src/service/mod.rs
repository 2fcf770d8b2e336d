pub mod affiliate_service;
pub mod compression;
pub mod directory;
pub mod downline_service;
pub mod error;
pub mod hierarchy;
pub mod report_service;
pub mod status_sync;
pub mod tree_audit;

#[cfg(test)]
pub(crate) mod fixtures;

use serde::Serialize;

/// One page of a listing together with the paging totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: u32, limit: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1) as i64;
        let offset = (page as i64 - 1) * limit;
        let total_pages = ((total + limit - 1) / limit).max(1);
        let has_more = offset + (items.len() as i64) < total;

        Page {
            items,
            total,
            page,
            total_pages,
            has_more,
        }
    }
}
