//! 错误处理模块
//!
//! 该模块提供 DiskPolicy 项目的统一错误类型。磁盘定位、策略查询与挂载
//! 过程中的每一种终止状态都对应一个独立的变体，便于日志记录与汇总。

use thiserror::Error;

/// 底层云 API 错误（传输、认证、非预期的 HTTP 状态等）
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// DiskPolicy 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 在配置的可用区和区域中都未找到磁盘
    #[error("未找到磁盘 {disk}: 可用区 {zone} 与区域 {region} 中均不存在")]
    DiskNotFound {
        disk: String,
        zone: String,
        region: String,
    },

    /// 同名磁盘匹配到多个资源
    #[error("磁盘 {disk} 匹配到多个资源: {}", .candidates.join(", "))]
    AmbiguousDisk {
        disk: String,
        candidates: Vec<String>,
    },

    /// 快照策略不存在
    #[error("未找到快照策略 {policy} (区域 {region})")]
    PolicyNotFound { policy: String, region: String },

    /// 磁盘已挂载了另一个策略，需要人工处理
    #[error("磁盘 {disk} 已挂载策略 {attached}，与期望的策略 {desired} 不一致，请手动卸载后重试")]
    PolicyConflict {
        disk: String,
        attached: String,
        desired: String,
    },

    /// 磁盘挂载了多个策略，不符合单策略假设
    #[error("磁盘 {disk} 挂载了 {} 个资源策略，状态异常: {}", .policies.len(), .policies.join(", "))]
    UnexpectedPolicyState { disk: String, policies: Vec<String> },

    /// 同一次运行中同一磁盘被指定了不同的策略
    #[error("磁盘 {disk} 被多个声明指定了不同的策略: {}", .policies.join(", "))]
    ConflictingTargets { disk: String, policies: Vec<String> },

    /// 运行被取消，该磁盘未被处理
    #[error("运行已取消，磁盘 {disk} 未处理")]
    Cancelled { disk: String },

    /// 云 API 调用失败
    #[error("{context}: {source}")]
    Provider {
        context: String,
        #[source]
        source: BoxError,
    },

    /// 一次运行中存在失败的磁盘
    #[error("共 {total} 个磁盘，其中 {failures} 个添加快照策略失败")]
    RunFailed { failures: usize, total: usize },

    /// 扫描存储声明失败
    #[error("扫描存储声明失败: {0}")]
    Scan(String),
}

/// DiskPolicy 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 包装云 API 错误并附带上下文
    pub fn provider(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Provider {
            context: context.into(),
            source: source.into(),
        }
    }

    /// 错误类别的简短标识，用于结构化日志
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DiskNotFound { .. } => "DiskNotFound",
            Error::AmbiguousDisk { .. } => "AmbiguousDisk",
            Error::PolicyNotFound { .. } => "PolicyNotFound",
            Error::PolicyConflict { .. } => "PolicyConflict",
            Error::UnexpectedPolicyState { .. } => "UnexpectedPolicyState",
            Error::ConflictingTargets { .. } => "ConflictingTargets",
            Error::Cancelled { .. } => "Cancelled",
            Error::Provider { .. } => "ProviderError",
            Error::RunFailed { .. } => "RunFailed",
            Error::Scan(_) => "Scan",
        }
    }

    /// 是否需要人工介入（这类错误永远不会被自动修复）
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Error::PolicyConflict { .. }
                | Error::UnexpectedPolicyState { .. }
                | Error::ConflictingTargets { .. }
        )
    }
}
