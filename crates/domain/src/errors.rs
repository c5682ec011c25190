//! 领域模型错误定义
//!
//! 错误分类与校验、引用解析一一对应：所有校验错误在任何存储
//! 变更之前被检测并返回。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 请求字段缺失或格式错误
    #[error("无效输入: {message}")]
    InvalidInput { message: String },

    /// 引用的资源不存在
    #[error("资源不存在: {resource_type} {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// 当前实体状态下不允许该操作
    #[error("操作不允许: {message}")]
    InvalidOperation { message: String },

    /// 身份无法确认
    #[error("未授权: {message}")]
    Unauthorized { message: String },

    /// 并发冲突
    #[error("并发冲突: {message}")]
    Conflict { message: String },

    /// 存储层错误
    #[error("存储错误: {message}")]
    Storage { message: String },
}

impl DomainError {
    /// 创建无效输入错误
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    /// 创建操作不允许错误
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// 创建未授权错误
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// 创建并发冲突错误
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// 创建存储层错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
