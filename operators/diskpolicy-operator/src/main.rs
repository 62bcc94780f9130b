use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use diskpolicy_operator::config::{DiskPolicyConfig, DEFAULT_CONFIG_PATH};
use diskpolicy_operator::{init_logging, DiskPolicyOperator};

/// 为带注解的 PersistentVolumeClaim 对应的 GCE 磁盘挂载快照策略
#[derive(Parser, Debug)]
#[command(name = "diskpolicy", version, about)]
struct Args {
    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_file: PathBuf,

    /// kubeconfig 路径，不指定时使用集群内配置或本地默认配置
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// 在集群外运行，使用本地的应用默认凭据访问 GCP
    #[arg(long)]
    local: bool,

    /// 同时处理的磁盘数
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = DiskPolicyConfig::load(&args.config_file)?;
    let operator =
        DiskPolicyOperator::new(&config, args.kubeconfig.as_deref(), args.concurrency, args.local).await?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，等待进行中的操作完成...");
            signal.cancel();
        }
    });

    let report = operator.run(&cancel).await?;
    report.into_result()?;

    info!("快照策略更新完成，退出");
    Ok(())
}
