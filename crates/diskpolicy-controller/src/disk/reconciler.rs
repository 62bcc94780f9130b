//! 快照策略协调模块
//!
//! 对每个目标磁盘执行"比较后按需挂载"：查询期望策略的 self-link，定位磁盘，
//! 检查已挂载的策略，仅在磁盘没有任何策略时挂载一次。已挂载其他策略或
//! 挂载了多个策略的磁盘需要人工处理，这里只报告不修复。
//!
//! 一次运行中各磁盘相互独立，某个磁盘失败不影响其余磁盘。

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use diskpolicy_common::{DiskTarget, Error, Locality, Policy, ResolvedDisk, Result};

use super::locator::DiskLocator;
use super::policy_cache::PolicyCache;
use crate::gcp::{DiskPolicyProvider, GcpScope};

/// 单个磁盘的协调结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// 期望的策略已挂载，无需操作
    AlreadyAttached,
    /// 已挂载期望的策略
    Attached,
}

/// 检查已挂载策略后的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachDecision {
    NoOp,
    Attach,
}

/// 根据磁盘当前挂载的策略决定是否挂载
fn decide(disk: &ResolvedDisk, desired: &Policy) -> Result<AttachDecision> {
    match disk.resource_policies.as_slice() {
        [] => Ok(AttachDecision::Attach),
        [attached] if *attached == desired.self_link => Ok(AttachDecision::NoOp),
        [attached] => Err(Error::PolicyConflict {
            disk: disk.name.clone(),
            attached: attached.clone(),
            desired: desired.self_link.clone(),
        }),
        policies => Err(Error::UnexpectedPolicyState {
            disk: disk.name.clone(),
            policies: policies.to_vec(),
        }),
    }
}

/// 单个目标的结果
#[derive(Debug)]
pub struct TargetResult {
    /// 目标
    pub target: DiskTarget,
    /// 结果
    pub result: Result<ReconcileOutcome>,
}

/// 一次运行的汇总
#[derive(Debug, Default)]
pub struct RunReport {
    /// 按输入顺序排列的结果
    pub results: Vec<TargetResult>,
}

impl RunReport {
    /// 目标总数
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// 失败的目标
    pub fn failures(&self) -> impl Iterator<Item = (&DiskTarget, &Error)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.target, e)))
    }

    /// 失败数
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// 本次新挂载的磁盘数
    pub fn attached_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.result, Ok(ReconcileOutcome::Attached)))
            .count()
    }

    /// 是否全部成功
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// 转换为运行结果
    pub fn into_result(self) -> Result<()> {
        let failures = self.failure_count();
        if failures > 0 {
            return Err(Error::RunFailed {
                failures,
                total: self.total(),
            });
        }
        Ok(())
    }
}

/// 运行前的目标规划
#[derive(Debug)]
enum Planned {
    Run(DiskTarget),
    Reject(DiskTarget, Error),
}

/// 合并重复目标，同一磁盘被指定了不同策略时拒绝其所有目标
fn plan_targets(targets: Vec<DiskTarget>) -> Vec<Planned> {
    let mut policies: HashMap<String, Vec<String>> = HashMap::new();
    for target in &targets {
        let entry = policies.entry(target.disk_name.clone()).or_default();
        if !entry.contains(&target.policy_name) {
            entry.push(target.policy_name.clone());
        }
    }

    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(targets.len());
    for target in targets {
        let disk_policies = &policies[&target.disk_name];
        if disk_policies.len() > 1 {
            let err = Error::ConflictingTargets {
                disk: target.disk_name.clone(),
                policies: disk_policies.clone(),
            };
            planned.push(Planned::Reject(target, err));
        } else if seen.insert(target.disk_name.clone()) {
            planned.push(Planned::Run(target));
        } else {
            debug!("忽略重复的目标: {}", target);
        }
    }

    planned
}

/// 快照策略协调器
pub struct PolicyReconciler<P: ?Sized> {
    /// 云端服务
    provider: Arc<P>,
    /// 磁盘定位器
    locator: DiskLocator<P>,
    /// 策略缓存
    policies: PolicyCache<P>,
    /// 项目、可用区与区域
    scope: GcpScope,
    /// 同时处理的磁盘数
    concurrency: usize,
}

impl<P: DiskPolicyProvider + ?Sized> PolicyReconciler<P> {
    /// 创建新的协调器，默认逐个处理磁盘
    pub fn new(provider: Arc<P>, scope: GcpScope) -> Self {
        Self {
            locator: DiskLocator::new(provider.clone(), scope.clone()),
            policies: PolicyCache::new(provider.clone(), scope.clone()),
            provider,
            scope,
            concurrency: 1,
        }
    }

    /// 设置同时处理的磁盘数
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 协调单个磁盘
    pub async fn reconcile(&self, target: &DiskTarget) -> Result<ReconcileOutcome> {
        let policy = self.policies.get_policy(&target.policy_name).await?;
        let disk = self.locator.locate(&target.disk_name).await?;

        if decide(&disk, &policy)? == AttachDecision::NoOp {
            info!("磁盘 {} 已挂载策略 {}，无需操作", disk.name, target.policy_name);
            return Ok(ReconcileOutcome::AlreadyAttached);
        }

        let project = &self.scope.project;
        match &disk.locality {
            Locality::Zonal { zone } => {
                debug!("磁盘 {} 为可用区磁盘: {}", disk.name, zone);
                self.provider
                    .attach_policy_zonal(project, zone, &disk.name, &policy.self_link)
                    .await?;
            }
            Locality::Regional { region } => {
                debug!("磁盘 {} 为区域磁盘: {}", disk.name, region);
                self.provider
                    .attach_policy_regional(project, region, &disk.name, &policy.self_link)
                    .await?;
            }
        }

        info!("已为磁盘 {} 挂载快照策略 {}", disk.name, target.policy_name);
        Ok(ReconcileOutcome::Attached)
    }

    /// 协调所有目标
    ///
    /// 取消后不再开始新的磁盘，正在进行的挂载调用会执行完毕；未开始的目标
    /// 记为 `Error::Cancelled`。
    pub async fn run(&self, targets: Vec<DiskTarget>, cancel: &CancellationToken) -> RunReport {
        let mut results: Vec<(usize, TargetResult)> = Vec::new();
        let mut runnable = Vec::new();

        for (index, planned) in plan_targets(targets).into_iter().enumerate() {
            match planned {
                Planned::Run(target) => runnable.push((index, target)),
                Planned::Reject(target, err) => {
                    log_failure(&target, &err);
                    results.push((index, TargetResult { target, result: Err(err) }));
                }
            }
        }

        info!("开始处理 {} 个磁盘，并发数 {}", runnable.len(), self.concurrency);

        let finished: Vec<(usize, TargetResult)> = stream::iter(runnable)
            .map(move |(index, target)| async move {
                if cancel.is_cancelled() {
                    warn!("运行已取消，跳过磁盘 {}", target.disk_name);
                    let err = Error::Cancelled {
                        disk: target.disk_name.clone(),
                    };
                    return (index, TargetResult { target, result: Err(err) });
                }

                let result = self.reconcile(&target).await;
                if let Err(err) = &result {
                    log_failure(&target, err);
                }
                (index, TargetResult { target, result })
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.extend(finished);
        results.sort_by_key(|(index, _)| *index);

        let report = RunReport {
            results: results.into_iter().map(|(_, result)| result).collect(),
        };
        debug!("本次运行缓存了 {} 个快照策略", self.policies.len().await);

        if report.is_success() {
            info!(
                "快照策略更新完成: 共 {} 个磁盘，新挂载 {} 个",
                report.total(),
                report.attached_count()
            );
        } else {
            error!(
                "共 {} 个磁盘，其中 {} 个添加快照策略失败",
                report.total(),
                report.failure_count()
            );
        }

        report
    }
}

fn log_failure(target: &DiskTarget, err: &Error) {
    error!(
        disk = %target.disk_name,
        policy = %target.policy_name,
        claim = target.claim.as_deref().unwrap_or("-"),
        kind = err.kind(),
        requires_operator = err.requires_operator(),
        "为磁盘 {} 添加快照策略 {} 失败: {}",
        target.disk_name,
        target.policy_name,
        err
    );
    if err.requires_operator() {
        warn!("磁盘 {} 需要人工处理，重新运行不会自动修复", target.disk_name);
    }
}
