//! 磁盘定位模块
//!
//! 根据磁盘名称在配置的可用区和区域中分别查找，返回唯一的磁盘及其位置。
//! 某个作用域中不存在是正常结果；两个作用域都不存在或都存在时返回错误。

use std::sync::Arc;
use tracing::{debug, info, warn};

use diskpolicy_common::{Error, ResolvedDisk, Result};

use crate::gcp::{DiskPolicyProvider, GcpScope};

/// 磁盘定位器
pub struct DiskLocator<P: ?Sized> {
    /// 云端服务
    provider: Arc<P>,
    /// 项目、可用区与区域
    scope: GcpScope,
}

impl<P: DiskPolicyProvider + ?Sized> DiskLocator<P> {
    /// 创建新的磁盘定位器
    pub fn new(provider: Arc<P>, scope: GcpScope) -> Self {
        Self { provider, scope }
    }

    /// 查找磁盘
    pub async fn locate(&self, disk_name: &str) -> Result<ResolvedDisk> {
        let GcpScope { project, zone, region } = &self.scope;

        if disk_name.is_empty() {
            return Err(self.not_found(disk_name));
        }

        let (zonal, regional) = tokio::join!(
            self.provider.get_zonal_disk(project, zone, disk_name),
            self.provider.get_regional_disk(project, region, disk_name),
        );

        // 任一作用域查询失败时无法排除重名，两侧的失败都要报告
        let (zonal, regional) = match (zonal, regional) {
            (Ok(zonal), Ok(regional)) => (zonal, regional),
            (Err(zonal_err), Err(regional_err)) => {
                return Err(Error::provider(
                    format!("查找磁盘 {} 失败", disk_name),
                    format!("可用区 {}: {}; 区域 {}: {}", zone, zonal_err, region, regional_err),
                ));
            }
            (Err(err), Ok(other)) | (Ok(other), Err(err)) => {
                if let Some(found) = other {
                    warn!("另一作用域中存在磁盘 {}，但查询失败，无法确认是否重名", found.qualified_name());
                }
                return Err(err);
            }
        };
        debug!("可用区 {} 中{}磁盘 {}", zone, if zonal.is_some() { "存在" } else { "不存在" }, disk_name);
        debug!("区域 {} 中{}磁盘 {}", region, if regional.is_some() { "存在" } else { "不存在" }, disk_name);

        match (zonal, regional) {
            (Some(disk), None) | (None, Some(disk)) => {
                info!("找到磁盘 {}: {}", disk_name, disk.locality);
                Ok(disk)
            }
            (None, None) => Err(self.not_found(disk_name)),
            (Some(zonal), Some(regional)) => Err(Error::AmbiguousDisk {
                disk: disk_name.to_string(),
                candidates: vec![zonal.qualified_name(), regional.qualified_name()],
            }),
        }
    }

    fn not_found(&self, disk_name: &str) -> Error {
        Error::DiskNotFound {
            disk: disk_name.to_string(),
            zone: self.scope.zone.clone(),
            region: self.scope.region.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::MockDiskPolicyProvider;
    use diskpolicy_common::Locality;

    fn scope() -> GcpScope {
        GcpScope::new("test-project", "us-central1-a", "us-central1")
    }

    fn disk(name: &str, locality: Locality) -> ResolvedDisk {
        ResolvedDisk {
            name: name.to_string(),
            resource_policies: Vec::new(),
            locality,
        }
    }

    #[tokio::test]
    async fn test_locate_zonal() {
        let mut provider = MockDiskPolicyProvider::new();
        provider
            .expect_get_zonal_disk()
            .withf(|project, zone, name| project == "test-project" && zone == "us-central1-a" && name == "disk-1")
            .times(1)
            .returning(|_, zone, name| Ok(Some(disk(name, Locality::Zonal { zone: zone.to_string() }))));
        provider
            .expect_get_regional_disk()
            .withf(|_, region, _| region == "us-central1")
            .times(1)
            .returning(|_, _, _| Ok(None));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let resolved = locator.locate("disk-1").await.unwrap();
        assert_eq!(resolved.locality, Locality::Zonal { zone: "us-central1-a".to_string() });
    }

    #[tokio::test]
    async fn test_locate_regional() {
        let mut provider = MockDiskPolicyProvider::new();
        provider.expect_get_zonal_disk().returning(|_, _, _| Ok(None));
        provider
            .expect_get_regional_disk()
            .returning(|_, region, name| Ok(Some(disk(name, Locality::Regional { region: region.to_string() }))));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let resolved = locator.locate("disk-2").await.unwrap();
        assert_eq!(resolved.locality, Locality::Regional { region: "us-central1".to_string() });
        assert_eq!(resolved.name, "disk-2");
    }

    #[tokio::test]
    async fn test_locate_not_found_names_both_scopes() {
        let mut provider = MockDiskPolicyProvider::new();
        provider.expect_get_zonal_disk().returning(|_, _, _| Ok(None));
        provider.expect_get_regional_disk().returning(|_, _, _| Ok(None));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let err = locator.locate("missing").await.unwrap_err();
        match err {
            Error::DiskNotFound { disk, zone, region } => {
                assert_eq!(disk, "missing");
                assert_eq!(zone, "us-central1-a");
                assert_eq!(region, "us-central1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_locate_ambiguous() {
        let mut provider = MockDiskPolicyProvider::new();
        provider
            .expect_get_zonal_disk()
            .returning(|_, zone, name| Ok(Some(disk(name, Locality::Zonal { zone: zone.to_string() }))));
        provider
            .expect_get_regional_disk()
            .returning(|_, region, name| Ok(Some(disk(name, Locality::Regional { region: region.to_string() }))));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let err = locator.locate("disk-1").await.unwrap_err();
        assert_eq!(err.kind(), "AmbiguousDisk");
        assert!(err.to_string().contains("zones/us-central1-a/disks/disk-1"));
        assert!(err.to_string().contains("regions/us-central1/disks/disk-1"));
    }

    #[tokio::test]
    async fn test_locate_zonal_error_still_queries_regional() {
        let mut provider = MockDiskPolicyProvider::new();
        provider
            .expect_get_zonal_disk()
            .times(1)
            .returning(|_, _, _| Err(Error::provider("获取可用区磁盘失败", "HTTP 403 Forbidden")));
        provider
            .expect_get_regional_disk()
            .times(1)
            .returning(|_, region, name| Ok(Some(disk(name, Locality::Regional { region: region.to_string() }))));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let err = locator.locate("disk-1").await.unwrap_err();
        assert_eq!(err.kind(), "ProviderError");
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_locate_reports_both_lookup_failures() {
        let mut provider = MockDiskPolicyProvider::new();
        provider
            .expect_get_zonal_disk()
            .returning(|_, _, _| Err(Error::provider("获取可用区磁盘失败", "HTTP 403 Forbidden")));
        provider
            .expect_get_regional_disk()
            .returning(|_, _, _| Err(Error::provider("获取区域磁盘失败", "HTTP 503 Service Unavailable")));

        let locator = DiskLocator::new(Arc::new(provider), scope());
        let err = locator.locate("disk-1").await.unwrap_err();
        let msg = err.to_string();
        assert_eq!(err.kind(), "ProviderError");
        assert!(msg.contains("us-central1-a") && msg.contains("403"));
        assert!(msg.contains("503"));
    }

    #[tokio::test]
    async fn test_locate_empty_name_skips_provider() {
        let mut provider = MockDiskPolicyProvider::new();
        provider.expect_get_zonal_disk().times(0);
        provider.expect_get_regional_disk().times(0);

        let locator = DiskLocator::new(Arc::new(provider), scope());
        assert_eq!(locator.locate("").await.unwrap_err().kind(), "DiskNotFound");
    }
}
