use std::collections::{BTreeMap, HashMap};
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use tracing::{debug, warn};

use super::{DEFAULT_GROUP, STARTUP_ORDER_ANNOTATION, ScaleError};
use crate::cluster::ClusterOps;
use crate::config::ScaleAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scalable unit discovered in the cluster. Rebuilt from a live listing
/// on every run; never cached across runs.
#[derive(Clone, Debug)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub kind: WorkloadKind,
    /// Desired replica count observed at discovery time.
    pub replicas: i32,
    /// Serialized pod selector, used only for termination polling.
    pub selector: String,
    // Transient convergence flags, owned by the waiter.
    pub(crate) pods_terminated: bool,
    pub(crate) pods_ready: bool,
}

/// Group number -> workloads. Keys must be iterated via [`sorted_groups`],
/// never in map order.
pub type StartupOrder = HashMap<u32, Vec<Workload>>;

/// Group numbers in scaling order: ascending for up (group 0 boots first),
/// descending for down (the default group stops first).
pub fn sorted_groups(order: &StartupOrder, action: ScaleAction) -> Vec<u32> {
    let mut groups: Vec<u32> = order.keys().copied().collect();
    groups.sort_unstable();
    if action == ScaleAction::Down {
        groups.reverse();
    }
    groups
}

/// Enumerate every Deployment and StatefulSet across all namespaces and
/// assign each to its startup group. Any list failure is fatal; there is no
/// partial catalog.
pub async fn build_startup_order<C: ClusterOps>(
    cluster: &C,
) -> Result<StartupOrder, ScaleError> {
    let mut order = StartupOrder::new();

    let deployments =
        cluster
            .list_deployments()
            .await
            .map_err(|e| ScaleError::Discovery {
                what: "deployments",
                source: e,
            })?;
    for d in deployments {
        let workload = Workload {
            name: d.metadata.name.clone().unwrap_or_default(),
            namespace: d.metadata.namespace.clone().unwrap_or_default(),
            kind: WorkloadKind::Deployment,
            replicas: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
            selector: selector_string(d.spec.as_ref().map(|s| &s.selector)),
            pods_terminated: false,
            pods_ready: false,
        };
        let group = assign_group(&workload, d.metadata.annotations.as_ref());
        order.entry(group).or_default().push(workload);
    }

    let statefulsets =
        cluster
            .list_statefulsets()
            .await
            .map_err(|e| ScaleError::Discovery {
                what: "statefulsets",
                source: e,
            })?;
    for s in statefulsets {
        let workload = Workload {
            name: s.metadata.name.clone().unwrap_or_default(),
            namespace: s.metadata.namespace.clone().unwrap_or_default(),
            kind: WorkloadKind::StatefulSet,
            replicas: s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(0),
            selector: selector_string(s.spec.as_ref().map(|sp| &sp.selector)),
            pods_terminated: false,
            pods_ready: false,
        };
        let group = assign_group(&workload, s.metadata.annotations.as_ref());
        order.entry(group).or_default().push(workload);
    }

    debug!(groups = order.len(), "startup order built");
    Ok(order)
}

/// Read the startup-order annotation. Missing, unparsable, or out-of-range
/// values land in the default group with a warning rather than failing the
/// run.
pub(crate) fn assign_group(
    workload: &Workload,
    annotations: Option<&BTreeMap<String, String>>,
) -> u32 {
    let Some(raw) = annotations.and_then(|a| a.get(STARTUP_ORDER_ANNOTATION))
    else {
        return DEFAULT_GROUP;
    };

    match raw.parse::<u32>() {
        Ok(group) if group <= 99 => group,
        Ok(group) => {
            warn!(
                kind = %workload.kind,
                name = %workload.name,
                namespace = %workload.namespace,
                group,
                "startup order can only be 0 to 99; assigning to the default group"
            );
            DEFAULT_GROUP
        }
        Err(e) => {
            warn!(
                kind = %workload.kind,
                name = %workload.name,
                namespace = %workload.namespace,
                value = %raw,
                error = %e,
                "unparsable startup order annotation; assigning to the default group"
            );
            DEFAULT_GROUP
        }
    }
}

/// Serialize a label selector into the string form the pod list API accepts.
pub(crate) fn selector_string(selector: Option<&LabelSelector>) -> String {
    let Some(selector) = selector else {
        return String::new();
    };

    let mut terms = Vec::new();
    if let Some(labels) = &selector.match_labels {
        for (k, v) in labels {
            terms.push(format!("{k}={v}"));
        }
    }
    if let Some(exprs) = &selector.match_expressions {
        for expr in exprs {
            let values = expr.values.clone().unwrap_or_default().join(",");
            match expr.operator.as_str() {
                "In" => terms.push(format!("{} in ({})", expr.key, values)),
                "NotIn" => {
                    terms.push(format!("{} notin ({})", expr.key, values))
                }
                "Exists" => terms.push(expr.key.clone()),
                "DoesNotExist" => terms.push(format!("!{}", expr.key)),
                other => {
                    warn!(
                        key = %expr.key,
                        operator = %other,
                        "skipping unknown label selector operator"
                    );
                }
            }
        }
    }
    terms.join(",")
}
