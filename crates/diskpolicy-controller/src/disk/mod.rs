//! 磁盘快照策略模块
//!
//! 该模块负责定位云端磁盘并为其挂载快照策略，包含磁盘定位器、
//! 策略缓存和策略协调器。只依赖 `DiskPolicyProvider` 接口。

mod locator;
mod policy_cache;
mod reconciler;

pub use locator::DiskLocator;
pub use policy_cache::PolicyCache;
pub use reconciler::{PolicyReconciler, ReconcileOutcome, RunReport, TargetResult};
