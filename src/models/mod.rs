//! 数据模型模块

pub mod audit;
pub mod auth;
pub mod password;
pub mod role;
pub mod user;

use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// 分页参数：limit ≤ 0 或 > 100 时取 20，offset < 0 时取 0
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64) {
        let limit = match self.limit {
            Some(l) if l > 0 && l <= MAX_PAGE_SIZE => l,
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let page = |limit, offset| Pagination { limit, offset }.normalize();

        assert_eq!(page(None, None), (20, 0));
        assert_eq!(page(Some(0), Some(-5)), (20, 0));
        assert_eq!(page(Some(101), Some(10)), (20, 10));
        assert_eq!(page(Some(100), Some(0)), (100, 0));
        assert_eq!(page(Some(7), Some(3)), (7, 3));
    }
}
