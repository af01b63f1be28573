use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use super::{ScaleError, Scaler, is_self_managed};
use crate::cluster::ClusterOps;

impl<C: ClusterOps> Scaler<C> {
    /// Delete bare pods left running after a full scale-down: anything not
    /// owned by a ReplicaSet or StatefulSet and not carrying this
    /// controller's own label. No retry; the first deletion failure aborts
    /// with the pod's identity.
    pub(crate) async fn terminate_standalone_pods(
        &self,
    ) -> Result<(), ScaleError> {
        let pods = self.cluster.list_all_pods().await.map_err(|e| {
            ScaleError::Discovery {
                what: "pods",
                source: e,
            }
        })?;

        for pod in pods {
            let name = pod.metadata.name.clone().unwrap_or_default();
            let namespace = pod.metadata.namespace.clone().unwrap_or_default();

            if !is_standalone(&pod) {
                continue;
            }
            if is_self_managed(&pod.metadata) {
                debug!(name, namespace, "skipping pod that manages this app");
                continue;
            }

            debug!(name, namespace, "terminating leftover pod");
            self.cluster.delete_pod(&namespace, &name).await.map_err(
                |e| ScaleError::PodDelete {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    source: e,
                },
            )?;
        }

        Ok(())
    }
}

/// A pod is standalone when no owner reference points at a workload the
/// group mechanism already scaled down.
pub(crate) fn is_standalone(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .map(|refs| {
            !refs
                .iter()
                .any(|r| r.kind == "ReplicaSet" || r.kind == "StatefulSet")
        })
        .unwrap_or(true)
}
