//! 持久化存储接口定义
//!
//! 集合类字段（read_by/liked_by/message_unreads）的变更必须由
//! 实现以原子方式完成：带前置条件的单语句更新，而不是两步的
//! 读取-修改-写回。

pub mod message_repository;
pub mod room_repository;
pub mod user_repository;

pub use message_repository::*;
pub use room_repository::*;
pub use user_repository::*;

use serde::{Deserialize, Serialize};

/// 分页参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 30,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl<T> ListPage<T> {
    /// 构造分页结果，has_more = offset + 本页条数 < total
    pub fn new(data: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (data.len() as u64) < total;
        Self {
            data,
            total,
            limit: pagination.limit,
            offset: pagination.offset,
            has_more,
        }
    }

    /// 保持分页元数据不变地转换每个元素
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListPage<U> {
        ListPage {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more_flag() {
        let page = ListPage::new(vec![1, 2, 3], 10, Pagination::new(3, 0));
        assert!(page.has_more);

        let last = ListPage::new(vec![1], 4, Pagination::new(3, 3));
        assert!(!last.has_more);

        let empty: ListPage<i32> = ListPage::new(vec![], 0, Pagination::default());
        assert!(!empty.has_more);
    }
}
