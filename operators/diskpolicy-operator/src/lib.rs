//! DiskPolicy Operator - 为带注解的存储声明挂载快照策略
//!
//! 该模块扫描集群中带有目标注解的 PersistentVolumeClaim，解析其对应的 GCE 磁盘，
//! 并为每个磁盘挂载注解中指定的快照策略。

pub mod config;
pub mod scanner;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diskpolicy_controller::{ComputeClient, PolicyReconciler, RunReport};

use crate::config::DiskPolicyConfig;
use crate::scanner::StorageScanner;

/// Operator 主结构体
pub struct DiskPolicyOperator {
    /// 存储声明扫描器
    scanner: StorageScanner,
    /// 快照策略协调器
    reconciler: PolicyReconciler<ComputeClient>,
}

impl DiskPolicyOperator {
    /// 创建新的 Operator 实例
    ///
    /// `local` 表示在集群外运行，此时 GCP 使用本地的应用默认凭据。
    pub async fn new(
        config: &DiskPolicyConfig,
        kubeconfig: Option<&Path>,
        concurrency: usize,
        local: bool,
    ) -> Result<Self> {
        info!("创建客户端...");

        let client = build_kube_client(kubeconfig).await?;
        let scanner = StorageScanner::new(client, &config.target_annotation);
        let reconciler = diskpolicy_controller::init(config.scope(), concurrency, local)
            .await
            .context("创建 GCP 客户端失败")?;

        Ok(Self { scanner, reconciler })
    }

    /// 扫描并协调所有磁盘
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let targets = self.scanner.scan().await.context("获取持久磁盘失败")?;

        info!("为 {} 个磁盘添加快照策略...", targets.len());
        Ok(self.reconciler.run(targets, cancel).await)
    }
}

/// 创建 Kubernetes 客户端
///
/// 未指定 kubeconfig 时依次尝试集群内配置和本地默认配置。
async fn build_kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default().await.context("创建 Kubernetes 客户端失败");
    };

    let kubeconfig = Kubeconfig::read_from(path).context(format!("读取 kubeconfig 失败: {:?}", path))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("解析 kubeconfig 失败")?;

    Client::try_from(config).context("创建 Kubernetes 客户端失败")
}

/// 初始化日志，`RUST_LOG` 优先于传入的级别
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
