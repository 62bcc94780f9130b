//! 磁盘与快照策略模型
//!
//! 该模块定义了待协调的目标、云端磁盘的解析结果、磁盘的位置（可用区或区域）
//! 以及快照策略。策略通过 self-link 比较和挂载，而不是名称。

use std::fmt;

/// 待协调目标：磁盘名称与期望的快照策略名称
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskTarget {
    /// 磁盘名称
    pub disk_name: String,
    /// 期望的快照策略名称
    pub policy_name: String,
    /// 来源声明（namespace/name），仅用于日志
    pub claim: Option<String>,
}

impl DiskTarget {
    /// 创建新的目标
    pub fn new(disk_name: impl Into<String>, policy_name: impl Into<String>) -> Self {
        Self {
            disk_name: disk_name.into(),
            policy_name: policy_name.into(),
            claim: None,
        }
    }

    /// 记录来源声明
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = Some(claim.into());
        self
    }
}

impl fmt::Display for DiskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.disk_name, self.policy_name)
    }
}

/// 磁盘位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locality {
    /// 可用区磁盘
    Zonal { zone: String },
    /// 区域磁盘
    Regional { region: String },
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Zonal { zone } => write!(f, "zones/{}", zone),
            Locality::Regional { region } => write!(f, "regions/{}", region),
        }
    }
}

/// 云端返回的磁盘
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDisk {
    /// 磁盘名称
    pub name: String,
    /// 已挂载的资源策略 self-link，保持云端返回的顺序
    pub resource_policies: Vec<String>,
    /// 磁盘位置
    pub locality: Locality,
}

impl ResolvedDisk {
    /// 带位置的完整名称，如 zones/us-central1-a/disks/disk-1
    pub fn qualified_name(&self) -> String {
        format!("{}/disks/{}", self.locality, self.name)
    }
}

/// 快照策略
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Policy {
    /// 策略名称
    pub name: String,
    /// 策略 self-link，全局唯一，用于比较和挂载
    pub self_link: String,
}
