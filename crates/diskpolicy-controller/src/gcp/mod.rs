//! 云端磁盘与快照策略接口
//!
//! 该模块定义磁盘定位器和策略协调器所依赖的抽象接口 `DiskPolicyProvider`，
//! 以及基于 GCE Compute REST API 的实现和访问令牌来源。

mod compute_client;
mod token;

pub use compute_client::{ComputeClient, ComputeClientConfig, DEFAULT_COMPUTE_ENDPOINT};
pub use token::{Credentials, TokenSource, METADATA_TOKEN_URL, TOKEN_ENV_VAR};

use async_trait::async_trait;
use diskpolicy_common::{Policy, ResolvedDisk, Result};

/// 项目、可用区与区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpScope {
    /// GCP 项目 ID
    pub project: String,
    /// 可用区，如 us-central1-a
    pub zone: String,
    /// 区域，如 us-central1
    pub region: String,
}

impl GcpScope {
    /// 创建新的作用域
    pub fn new(project: impl Into<String>, zone: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            region: region.into(),
        }
    }
}

/// 磁盘与快照策略服务
///
/// 查询类方法用 `Ok(None)` 表示资源在该作用域中不存在，这是正常结果而非错误；
/// 传输、认证等失败返回 `Error::Provider`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiskPolicyProvider: Send + Sync {
    /// 获取可用区磁盘
    async fn get_zonal_disk(&self, project: &str, zone: &str, name: &str) -> Result<Option<ResolvedDisk>>;

    /// 获取区域磁盘
    async fn get_regional_disk(&self, project: &str, region: &str, name: &str) -> Result<Option<ResolvedDisk>>;

    /// 获取快照策略
    async fn get_policy(&self, project: &str, region: &str, name: &str) -> Result<Option<Policy>>;

    /// 为可用区磁盘挂载策略
    async fn attach_policy_zonal(&self, project: &str, zone: &str, disk: &str, policy_link: &str) -> Result<()>;

    /// 为区域磁盘挂载策略
    async fn attach_policy_regional(&self, project: &str, region: &str, disk: &str, policy_link: &str) -> Result<()>;
}
