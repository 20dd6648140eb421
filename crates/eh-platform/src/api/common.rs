//! Common API types and utilities

use serde::{Deserialize, Serialize};

use crate::domain::User;

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Page size bounds applied to every paginated endpoint
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A resolved page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }
}

impl PaginationParams {
    pub fn resolve(&self, limits: PageLimits) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            limit: self
                .limit
                .unwrap_or(limits.default_limit)
                .clamp(1, limits.max_limit),
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: Page, total: u64) -> Self {
        let total_pages = ((total as f64) / (page.limit as f64)).ceil() as u32;
        Self {
            data,
            page: page.page,
            limit: page.limit,
            total,
            total_pages,
        }
    }
}

/// `{ "msg": ... }` acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Public view of a user; never carries secrets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamp() {
        let limits = PageLimits::default();

        let page = PaginationParams::default().resolve(limits);
        assert_eq!(page, Page { page: 1, limit: 10 });
        assert_eq!(page.offset(), 0);

        let page = PaginationParams { page: Some(3), limit: Some(500) }.resolve(limits);
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset(), 200);

        let page = PaginationParams { page: Some(0), limit: Some(0) }.resolve(limits);
        assert_eq!(page, Page { page: 1, limit: 1 });
    }

    #[test]
    fn test_total_pages() {
        let resp = PaginatedResponse::new(vec![1, 2, 3], Page { page: 1, limit: 10 }, 25);
        assert_eq!(resp.total_pages, 3);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["totalPages"], 3);

        let empty: PaginatedResponse<u8> = PaginatedResponse::new(vec![], Page { page: 1, limit: 10 }, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
