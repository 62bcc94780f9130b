//! 存储声明扫描模块
//!
//! 该模块遍历集群中所有命名空间的 PersistentVolumeClaim，找出带有目标注解的声明，
//! 并通过其绑定的 PersistentVolume 解析出 GCE 磁盘名称。
//! 任何声明的卷无法解析都会中止整个扫描。

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::{
    api::{Api, ListParams},
    client::Client,
    ResourceExt,
};
use tracing::{debug, info};

use diskpolicy_common::{DiskTarget, Error, Result};
use diskpolicy_controller::utils::last_path_segment;

/// GKE 的 GCE PD CSI 驱动
pub const GCE_PD_CSI_DRIVER: &str = "pd.csi.storage.gke.io";

/// 存储声明扫描器
pub struct StorageScanner {
    /// Kubernetes 客户端
    client: Client,
    /// 目标注解键
    annotation: String,
}

impl StorageScanner {
    /// 创建新的扫描器
    pub fn new(client: Client, annotation: impl Into<String>) -> Self {
        Self {
            client,
            annotation: annotation.into(),
        }
    }

    /// 扫描带有目标注解的声明
    pub async fn scan(&self) -> Result<Vec<DiskTarget>> {
        info!("搜索带有注解 {} 的 PersistentVolumeClaim...", self.annotation);

        let claims: Api<PersistentVolumeClaim> = Api::all(self.client.clone());
        let volumes: Api<PersistentVolume> = Api::all(self.client.clone());

        let list = claims
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::Scan(format!("获取 PersistentVolumeClaim 列表失败: {}", e)))?;

        let mut targets = Vec::new();
        for pvc in list.items {
            let Some(policy) = annotated_policy(&pvc, &self.annotation) else {
                continue;
            };

            let claim = claim_name(&pvc);
            let volume_name = bound_volume(&pvc)?;
            let volume = volumes
                .get(&volume_name)
                .await
                .map_err(|e| Error::Scan(format!("获取 PersistentVolume {} 失败: {}", volume_name, e)))?;
            let disk = disk_name(&volume)?;

            info!("找到 PersistentVolumeClaim {} 对应的磁盘 {}", claim, disk);
            targets.push(DiskTarget::new(disk, policy).with_claim(claim));
        }

        debug!("共找到 {} 个需要处理的磁盘", targets.len());
        Ok(targets)
    }
}

/// 声明上的目标注解值
pub fn annotated_policy(pvc: &PersistentVolumeClaim, annotation: &str) -> Option<String> {
    pvc.annotations().get(annotation).cloned()
}

/// namespace/name 形式的声明名称
pub fn claim_name(pvc: &PersistentVolumeClaim) -> String {
    format!(
        "{}/{}",
        pvc.namespace().unwrap_or_else(|| "default".into()),
        pvc.name_any()
    )
}

/// 声明绑定的卷名称
pub fn bound_volume(pvc: &PersistentVolumeClaim) -> Result<String> {
    pvc.spec
        .as_ref()
        .and_then(|spec| spec.volume_name.clone())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Scan(format!("PersistentVolumeClaim {} 尚未绑定卷", claim_name(pvc))))
}

/// 卷对应的 GCE 磁盘名称
///
/// 支持内置的 `gcePersistentDisk` 卷和 GCE PD CSI 卷，CSI 卷的
/// `volumeHandle` 形如 `projects/p/zones/z/disks/name`。
pub fn disk_name(pv: &PersistentVolume) -> Result<String> {
    let name = pv.name_any();
    let spec = pv
        .spec
        .as_ref()
        .ok_or_else(|| Error::Scan(format!("PersistentVolume {} 缺少 spec", name)))?;

    if let Some(gce) = &spec.gce_persistent_disk {
        return Ok(gce.pd_name.clone());
    }

    if let Some(csi) = spec.csi.as_ref().filter(|csi| csi.driver == GCE_PD_CSI_DRIVER) {
        return last_path_segment(&csi.volume_handle).ok_or_else(|| {
            Error::Scan(format!(
                "PersistentVolume {} 的 volumeHandle 无效: {}",
                name, csi.volume_handle
            ))
        });
    }

    Err(Error::Scan(format!("PersistentVolume {} 不是 GCE 持久磁盘", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        CSIPersistentVolumeSource, GCEPersistentDiskVolumeSource, PersistentVolumeClaimSpec,
        PersistentVolumeSpec,
    };
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const ANNOTATION: &str = "bio.terra/snapshot-policy";

    fn pvc(name: &str, volume: Option<&str>, annotations: &[(&str, &str)]) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("terra".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                volume_name: volume.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pv(name: &str, spec: PersistentVolumeSpec) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(spec),
            ..Default::default()
        }
    }

    #[test]
    fn test_annotated_policy() {
        let claim = pvc("pvc-1", Some("pv-1"), &[(ANNOTATION, "policy-a"), ("other", "x")]);
        assert_eq!(annotated_policy(&claim, ANNOTATION).as_deref(), Some("policy-a"));
        assert_eq!(claim_name(&claim), "terra/pvc-1");

        let plain = pvc("pvc-2", Some("pv-2"), &[("other", "x")]);
        assert!(annotated_policy(&plain, ANNOTATION).is_none());
    }

    #[test]
    fn test_unbound_claim_is_error() {
        let claim = pvc("pvc-1", None, &[(ANNOTATION, "policy-a")]);
        let err = bound_volume(&claim).unwrap_err();
        assert_eq!(err.kind(), "Scan");
        assert!(err.to_string().contains("terra/pvc-1"));

        let bound = pvc("pvc-2", Some("pv-2"), &[]);
        assert_eq!(bound_volume(&bound).unwrap(), "pv-2");
    }

    #[test]
    fn test_gce_persistent_disk_name() {
        let volume = pv(
            "pv-1",
            PersistentVolumeSpec {
                gce_persistent_disk: Some(GCEPersistentDiskVolumeSource {
                    pd_name: "disk-1".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(disk_name(&volume).unwrap(), "disk-1");
    }

    #[test]
    fn test_csi_disk_name() {
        let volume = pv(
            "pv-2",
            PersistentVolumeSpec {
                csi: Some(CSIPersistentVolumeSource {
                    driver: GCE_PD_CSI_DRIVER.to_string(),
                    volume_handle: "projects/test-project/regions/us-central1/disks/disk-2".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(disk_name(&volume).unwrap(), "disk-2");
    }

    #[test]
    fn test_non_gce_volume_is_error() {
        let volume = pv(
            "pv-3",
            PersistentVolumeSpec {
                csi: Some(CSIPersistentVolumeSource {
                    driver: "ebs.csi.aws.com".to_string(),
                    volume_handle: "vol-123".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(disk_name(&volume).unwrap_err().kind(), "Scan");
    }
}
