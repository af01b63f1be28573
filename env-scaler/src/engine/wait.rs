use std::fmt;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use tokio::time::Instant;
use tracing::debug;

use super::{
    ScaleError,
    catalog::{Workload, WorkloadKind},
};
use crate::cluster::ClusterOps;

/// Fixed-interval polling bounded by an absolute deadline derived from the
/// start of the wait. Deadline expiry is a terminal timeout, not a retry.
#[derive(Clone, Copy, Debug)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitGoal {
    Terminated,
    Ready,
}

impl fmt::Display for WaitGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitGoal::Terminated => f.write_str("terminated"),
            WaitGoal::Ready => f.write_str("ready"),
        }
    }
}

/// Block until no pods matching any resource's selector remain, or the
/// deadline expires.
pub(crate) async fn wait_for_termination<C: ClusterOps>(
    cluster: &C,
    policy: &WaitPolicy,
    group: u32,
    resources: &mut [Workload],
) -> Result<(), ScaleError> {
    let deadline = Instant::now() + policy.timeout;

    loop {
        tokio::time::sleep(policy.interval).await;
        if Instant::now() > deadline {
            return Err(ScaleError::ConvergenceTimeout {
                group,
                goal: WaitGoal::Terminated,
            });
        }

        for r in resources.iter_mut() {
            if r.pods_terminated {
                continue;
            }
            debug!(
                kind = %r.kind,
                name = %r.name,
                namespace = %r.namespace,
                selector = %r.selector,
                "finding non-terminated pods"
            );
            let pods = cluster
                .list_pods(&r.namespace, Some(&r.selector))
                .await
                .map_err(|e| ScaleError::Status {
                    kind: r.kind.as_str(),
                    name: r.name.clone(),
                    namespace: r.namespace.clone(),
                    source: e,
                })?;
            if pods.is_empty() {
                debug!(
                    name = %r.name,
                    namespace = %r.namespace,
                    "pods have been terminated"
                );
                r.pods_terminated = true;
            } else {
                debug!(
                    name = %r.name,
                    namespace = %r.namespace,
                    pod_count = pods.len(),
                    "pods still running"
                );
            }
        }

        if resources.iter().all(|r| r.pods_terminated) {
            return Ok(());
        }
    }
}

/// Block until every resource reports all replicas available, updated, and
/// ready at the desired count, or the deadline expires.
pub(crate) async fn wait_for_readiness<C: ClusterOps>(
    cluster: &C,
    policy: &WaitPolicy,
    group: u32,
    resources: &mut [Workload],
) -> Result<(), ScaleError> {
    let deadline = Instant::now() + policy.timeout;

    loop {
        tokio::time::sleep(policy.interval).await;
        if Instant::now() > deadline {
            return Err(ScaleError::ConvergenceTimeout {
                group,
                goal: WaitGoal::Ready,
            });
        }

        for r in resources.iter_mut() {
            if r.pods_ready {
                continue;
            }
            debug!(
                kind = %r.kind,
                name = %r.name,
                namespace = %r.namespace,
                "checking if pods are updated and ready"
            );
            let ready = match r.kind {
                WorkloadKind::Deployment => {
                    let d = cluster
                        .get_deployment(&r.namespace, &r.name)
                        .await
                        .map_err(|e| ScaleError::Status {
                            kind: r.kind.as_str(),
                            name: r.name.clone(),
                            namespace: r.namespace.clone(),
                            source: e,
                        })?;
                    deployment_ready(&d)
                }
                WorkloadKind::StatefulSet => {
                    let s = cluster
                        .get_statefulset(&r.namespace, &r.name)
                        .await
                        .map_err(|e| ScaleError::Status {
                            kind: r.kind.as_str(),
                            name: r.name.clone(),
                            namespace: r.namespace.clone(),
                            source: e,
                        })?;
                    statefulset_ready(&s)
                }
            };
            if ready {
                debug!(
                    kind = %r.kind,
                    name = %r.name,
                    namespace = %r.namespace,
                    "workload ready"
                );
                r.pods_ready = true;
            }
        }

        if resources.iter().all(|r| r.pods_ready) {
            return Ok(());
        }
    }
}

// The observedGeneration guard protects against reading status the workload
// controller has not yet recomputed for the new spec.

pub(crate) fn deployment_ready(d: &Deployment) -> bool {
    let desired = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let Some(status) = d.status.as_ref() else {
        return false;
    };
    status.available_replicas.unwrap_or(0) == desired
        && status.updated_replicas.unwrap_or(0) == desired
        && status.ready_replicas.unwrap_or(0) == desired
        && status.observed_generation.unwrap_or(0)
            >= d.metadata.generation.unwrap_or(0)
}

pub(crate) fn statefulset_ready(s: &StatefulSet) -> bool {
    let desired = s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(0);
    let Some(status) = s.status.as_ref() else {
        return false;
    };
    status.available_replicas.unwrap_or(0) == desired
        && status.updated_replicas.unwrap_or(0) == desired
        && status.ready_replicas.unwrap_or(0) == desired
        && status.observed_generation.unwrap_or(0)
            >= s.metadata.generation.unwrap_or(0)
}
