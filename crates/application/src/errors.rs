//! 应用层错误定义

use domain::errors::DomainError;
use thiserror::Error;

/// 应用层错误类型
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 领域层错误
    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),

    /// 推送通知失败
    #[error("推送通知失败: {0}")]
    Notification(String),

    /// 事件广播失败
    #[error("事件广播失败: {0}")]
    Broadcast(String),
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;

impl ApplicationError {
    /// 取出内部的领域错误（广播/推送失败映射为Storage）
    pub fn as_domain(&self) -> DomainError {
        match self {
            ApplicationError::Domain(e) => e.clone(),
            ApplicationError::Notification(msg) | ApplicationError::Broadcast(msg) => {
                DomainError::storage(msg.clone())
            }
        }
    }
}
