//! DiskPolicy 控制器
//!
//! 该模块实现 DiskPolicy 的核心协调逻辑：按名称定位可用区或区域磁盘，
//! 比较已挂载的快照策略，并在需要时挂载期望的策略。
//! 通过 GCE Compute REST API 与云端交互。

pub mod disk;
pub mod gcp;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

pub use disk::{DiskLocator, PolicyReconciler, ReconcileOutcome, RunReport};
pub use gcp::{ComputeClient, ComputeClientConfig, Credentials, DiskPolicyProvider, GcpScope, TokenSource};

use diskpolicy_common::{Error, Result};

/// 创建基于 GCE Compute API 的协调器
///
/// `local` 为 true 时使用本地的应用默认凭据，否则使用元数据服务器。
pub async fn init(scope: GcpScope, concurrency: usize, local: bool) -> Result<PolicyReconciler<ComputeClient>> {
    let metadata_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::provider("创建元数据 HTTP 客户端失败", e))?;
    let token = TokenSource::from_env(metadata_http, local).await?;
    let client = ComputeClient::new(ComputeClientConfig::default(), token)?;

    Ok(PolicyReconciler::new(Arc::new(client), scope).with_concurrency(concurrency))
}
