//! GCE Compute REST 客户端
//!
//! 通过 `compute/v1` REST API 实现 `DiskPolicyProvider`。每个方法只发出一次
//! 有超时的 HTTP 请求；挂载接口返回的长时间运行操作不做轮询。

use async_trait::async_trait;
use diskpolicy_common::{Error, Locality, Policy, ResolvedDisk, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::token::TokenSource;
use super::DiskPolicyProvider;
use crate::utils::last_path_segment;

/// Compute API 默认地址
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ComputeClientConfig {
    /// API 地址，不带末尾的 `/`
    pub endpoint: String,
    /// 单次请求超时
    pub timeout: Duration,
}

impl Default for ComputeClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COMPUTE_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// API 返回的磁盘
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeDisk {
    name: String,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    resource_policies: Vec<String>,
}

/// API 返回的资源策略
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeResourcePolicy {
    name: String,
    self_link: String,
}

/// addResourcePolicies 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddResourcePoliciesRequest<'a> {
    resource_policies: [&'a str; 1],
}

/// 长时间运行操作
#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// GCE Compute 客户端
#[derive(Debug)]
pub struct ComputeClient {
    /// 客户端配置
    config: ComputeClientConfig,
    /// HTTP 客户端
    http: reqwest::Client,
    /// 访问令牌来源
    token: TokenSource,
}

impl ComputeClient {
    /// 创建新的客户端
    pub fn new(config: ComputeClientConfig, token: TokenSource) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::provider("创建 HTTP 客户端失败", e))?;

        Ok(Self { config, http, token })
    }

    /// 拼接资源地址
    fn url(&self, segments: &[&str]) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), segments.join("/"))
    }

    /// GET 资源，404 返回 `None`
    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<Option<T>> {
        let token = self.token.access_token().await?;
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::provider(context, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(context, format!("HTTP {}: {}", status, body)));
        }

        let value = response.json::<T>().await.map_err(|e| Error::provider(context, e))?;
        Ok(Some(value))
    }

    /// 调用 addResourcePolicies
    async fn add_resource_policies(&self, url: &str, policy_link: &str, context: &str) -> Result<()> {
        let token = self.token.access_token().await?;
        debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&AddResourcePoliciesRequest {
                resource_policies: [policy_link],
            })
            .send()
            .await
            .map_err(|e| Error::provider(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(context, format!("HTTP {}: {}", status, body)));
        }

        let operation: Operation = response.json().await.map_err(|e| Error::provider(context, e))?;
        if let Some(error) = operation.error.filter(|e| !e.errors.is_empty()) {
            let details = error
                .errors
                .iter()
                .map(|item| format!("{}: {}", item.code, item.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::provider(context, details));
        }

        debug!(
            "操作 {} 已提交，状态 {}",
            operation.name.as_deref().unwrap_or("-"),
            operation.status.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

/// 转换为带位置的磁盘，位置以响应中的 URL 为准
fn into_resolved(disk: ComputeDisk, fallback: Locality) -> ResolvedDisk {
    let locality = match fallback {
        Locality::Zonal { zone } => Locality::Zonal {
            zone: disk.zone.as_deref().and_then(last_path_segment).unwrap_or(zone),
        },
        Locality::Regional { region } => Locality::Regional {
            region: disk.region.as_deref().and_then(last_path_segment).unwrap_or(region),
        },
    };

    ResolvedDisk {
        name: disk.name,
        resource_policies: disk.resource_policies,
        locality,
    }
}

#[async_trait]
impl DiskPolicyProvider for ComputeClient {
    async fn get_zonal_disk(&self, project: &str, zone: &str, name: &str) -> Result<Option<ResolvedDisk>> {
        let url = self.url(&["projects", project, "zones", zone, "disks", name]);
        let context = format!("获取可用区 {} 中的磁盘 {} 失败", zone, name);
        let disk = self.get_json::<ComputeDisk>(&url, &context).await?;

        Ok(disk.map(|d| into_resolved(d, Locality::Zonal { zone: zone.to_string() })))
    }

    async fn get_regional_disk(&self, project: &str, region: &str, name: &str) -> Result<Option<ResolvedDisk>> {
        let url = self.url(&["projects", project, "regions", region, "disks", name]);
        let context = format!("获取区域 {} 中的磁盘 {} 失败", region, name);
        let disk = self.get_json::<ComputeDisk>(&url, &context).await?;

        Ok(disk.map(|d| into_resolved(d, Locality::Regional { region: region.to_string() })))
    }

    async fn get_policy(&self, project: &str, region: &str, name: &str) -> Result<Option<Policy>> {
        let url = self.url(&["projects", project, "regions", region, "resourcePolicies", name]);
        let context = format!("获取快照策略 {} 失败", name);
        let policy = self.get_json::<ComputeResourcePolicy>(&url, &context).await?;

        Ok(policy.map(|p| Policy {
            name: p.name,
            self_link: p.self_link,
        }))
    }

    async fn attach_policy_zonal(&self, project: &str, zone: &str, disk: &str, policy_link: &str) -> Result<()> {
        let url = self.url(&["projects", project, "zones", zone, "disks", disk, "addResourcePolicies"]);
        let context = format!("为可用区磁盘 {} 挂载策略失败", disk);
        self.add_resource_policies(&url, policy_link, &context).await
    }

    async fn attach_policy_regional(&self, project: &str, region: &str, disk: &str, policy_link: &str) -> Result<()> {
        let url = self.url(&["projects", project, "regions", region, "disks", disk, "addResourcePolicies"]);
        let context = format!("为区域磁盘 {} 挂载策略失败", disk);
        self.add_resource_policies(&url, policy_link, &context).await
    }
}
