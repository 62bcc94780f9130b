//! 快照策略缓存模块
//!
//! 在一次运行内缓存策略名称到 self-link 的映射，多个磁盘使用同一策略时
//! 只查询一次。策略在运行期间视为不变，因此缓存没有过期机制；
//! 未找到的策略不缓存。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use diskpolicy_common::{Error, Policy, Result};

use crate::gcp::{DiskPolicyProvider, GcpScope};

/// 策略缓存
pub struct PolicyCache<P: ?Sized> {
    /// 缓存数据
    cache: RwLock<HashMap<String, Policy>>,
    /// 云端服务
    provider: Arc<P>,
    /// 项目与区域
    scope: GcpScope,
}

impl<P: DiskPolicyProvider + ?Sized> PolicyCache<P> {
    /// 创建新的策略缓存
    pub fn new(provider: Arc<P>, scope: GcpScope) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            provider,
            scope,
        }
    }

    /// 按名称获取策略
    pub async fn get_policy(&self, name: &str) -> Result<Policy> {
        if name.is_empty() {
            return Err(self.not_found(name));
        }

        if let Some(policy) = self.cache.read().await.get(name) {
            debug!("从缓存获取快照策略: {}", name);
            return Ok(policy.clone());
        }

        let policy = self
            .provider
            .get_policy(&self.scope.project, &self.scope.region, name)
            .await?
            .ok_or_else(|| self.not_found(name))?;

        debug!("快照策略 {} 的 self-link: {}", name, policy.self_link);
        self.cache.write().await.insert(name.to_string(), policy.clone());

        Ok(policy)
    }

    fn not_found(&self, name: &str) -> Error {
        Error::PolicyNotFound {
            policy: name.to_string(),
            region: self.scope.region.clone(),
        }
    }

    /// 当前缓存条目数
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::MockDiskPolicyProvider;

    fn scope() -> GcpScope {
        GcpScope::new("test-project", "us-central1-a", "us-central1")
    }

    #[tokio::test]
    async fn test_policy_is_fetched_once() {
        let mut provider = MockDiskPolicyProvider::new();
        provider
            .expect_get_policy()
            .withf(|project, region, name| project == "test-project" && region == "us-central1" && name == "policy-a")
            .times(1)
            .returning(|_, _, name| {
                Ok(Some(Policy {
                    name: name.to_string(),
                    self_link: format!("links/{}", name),
                }))
            });

        let cache = PolicyCache::new(Arc::new(provider), scope());
        let first = cache.get_policy("policy-a").await.unwrap();
        let second = cache.get_policy("policy-a").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.self_link, "links/policy-a");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_policy() {
        let mut provider = MockDiskPolicyProvider::new();
        provider.expect_get_policy().times(2).returning(|_, _, _| Ok(None));

        let cache = PolicyCache::new(Arc::new(provider), scope());
        for _ in 0..2 {
            let err = cache.get_policy("policy-x").await.unwrap_err();
            assert!(matches!(err, Error::PolicyNotFound { ref policy, .. } if policy == "policy-x"));
        }
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_name_skips_provider() {
        let mut provider = MockDiskPolicyProvider::new();
        provider.expect_get_policy().times(0);

        let cache = PolicyCache::new(Arc::new(provider), scope());
        assert_eq!(cache.get_policy("").await.unwrap_err().kind(), "PolicyNotFound");
    }
}
