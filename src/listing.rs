//! Paginated photo listings.
//!
//! Query parameters are parsed leniently: anything that does not parse falls
//! back to its default instead of failing the request.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ApiConfig;
use crate::db::PhotoFilter;

/// A normalized listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub filter: PhotoFilter,
    pub limit: u64,
    pub offset: u64,
}

impl PageRequest {
    pub fn new(folder: Option<&str>, limit: Option<&str>, offset: Option<&str>, api: &ApiConfig) -> Self {
        let default_limit = u64::from(api.default_limit.max(1));
        let max_limit = u64::from(api.max_limit.max(1));

        let limit = limit
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|&n| n > 0)
            .map(|n| n as u64)
            .unwrap_or(default_limit)
            .min(max_limit);

        let offset = offset
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        let filter = match folder.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => PhotoFilter::FolderSlug(slug.to_string()),
            None => PhotoFilter::All,
        };

        Self { filter, limit, offset }
    }

    pub fn from_query(query: &HashMap<String, String>, api: &ApiConfig) -> Self {
        Self::new(
            query.get("folder").map(String::as_str),
            query.get("limit").map(String::as_str),
            query.get("offset").map(String::as_str),
            api,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub count: u64,
    pub limit: u64,
    pub offset: u64,
    pub next_offset: Option<u64>,
    pub prev_offset: Option<u64>,
}

impl PageMeta {
    pub fn new(count: u64, limit: u64, offset: u64) -> Self {
        let next_offset = (offset + limit < count).then(|| offset + limit);
        let prev_offset = (offset > 0).then(|| offset.saturating_sub(limit));
        Self {
            count,
            limit,
            offset,
            next_offset,
            prev_offset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}
