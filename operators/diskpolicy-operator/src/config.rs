//! 配置管理模块
//!
//! 该模块负责加载 DiskPolicy 的配置文件，支持 YAML/JSON 格式。
//! 配置包含四个必填项：目标注解、GCP 项目、可用区与区域，缺少任何一项都会在启动时报错。

use anyhow::{anyhow, bail, Context, Result};
use config::{Config, File, FileFormat};
use diskpolicy_controller::GcpScope;
use serde::Deserialize;
use std::path::Path;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "/etc/diskpolicy/config.yaml";

/// DiskPolicy 配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskPolicyConfig {
    /// PVC 上的注解键，注解值为快照策略名称
    #[serde(alias = "targetannotation")]
    pub target_annotation: String,
    /// 集群和磁盘所在的 GCP 项目
    #[serde(alias = "googleproject")]
    pub google_project: String,
    /// 可用区
    pub zone: String,
    /// 区域
    pub region: String,
}

impl DiskPolicyConfig {
    /// 加载并校验配置文件
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_file = config_path.to_str().ok_or_else(|| anyhow!("配置路径无效"))?;

        // 确定配置文件格式
        let format = match config_path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => bail!("不支持的配置文件格式，仅支持 YAML 或 JSON"),
        };

        let config = Config::builder()
            .add_source(File::with_name(config_file).format(format))
            .build()
            .context(format!("无法加载配置文件: {:?}", config_path))?;

        let parsed = config
            .try_deserialize::<DiskPolicyConfig>()
            .context("配置格式错误")?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// 校验必填项
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("targetAnnotation", &self.target_annotation),
            ("googleProject", &self.google_project),
            ("zone", &self.zone),
            ("region", &self.region),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            bail!("配置项不能为空: {}", missing.join(", "));
        }
        Ok(())
    }

    /// GCP 作用域
    pub fn scope(&self) -> GcpScope {
        GcpScope::new(&self.google_project, &self.zone, &self.region)
    }
}
