use std::time::Duration;

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::{
    ORIGINAL_REPLICAS_ANNOTATION, ScaleError, Scaler, UPDATED_AT_ANNOTATION,
    annotations_mut,
    catalog::{Workload, WorkloadKind},
};
use crate::cluster::{ClusterError, ClusterOps};

/// Bounded retry budget for updates rejected with a version conflict, so a
/// persistently contended object surfaces as a hard failure instead of
/// looping forever. Backoff doubles per attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

impl<C: ClusterOps> Scaler<C> {
    pub(crate) async fn scale_down_group(
        &self,
        resources: &[Workload],
    ) -> Result<(), ScaleError> {
        for resource in resources {
            self.retry_on_conflict(
                resource.kind.as_str(),
                &resource.namespace,
                &resource.name,
                || self.scale_down_workload(resource),
            )
            .await?;
            debug!(
                kind = %resource.kind,
                name = %resource.name,
                namespace = %resource.namespace,
                "workload scaled down"
            );
        }
        Ok(())
    }

    pub(crate) async fn scale_up_group(
        &self,
        resources: &[Workload],
    ) -> Result<(), ScaleError> {
        for resource in resources {
            self.retry_on_conflict(
                resource.kind.as_str(),
                &resource.namespace,
                &resource.name,
                || self.scale_up_workload(resource),
            )
            .await?;
            debug!(
                kind = %resource.kind,
                name = %resource.name,
                namespace = %resource.namespace,
                "workload scaled up"
            );
        }
        Ok(())
    }

    /// Read-modify-write with bounded retries strictly on version conflicts.
    /// The live object is re-fetched on every attempt; any other error aborts
    /// immediately, wrapped with the resource identity.
    pub(crate) async fn retry_on_conflict<F, Fut>(
        &self,
        kind: &'static str,
        namespace: &str,
        name: &str,
        mut op: F,
    ) -> Result<(), ScaleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ClusterError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    attempt += 1;
                    if attempt >= self.retry.attempts {
                        warn!(
                            kind,
                            name,
                            namespace,
                            error = %e,
                            "conflict retries exhausted"
                        );
                        return Err(ScaleError::mutation(
                            kind, namespace, name, e,
                        ));
                    }
                    let backoff = self.retry.backoff * (1 << (attempt - 1));
                    trace!(
                        kind,
                        name,
                        namespace,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "conflict on update; retrying with a fresh object"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(ScaleError::mutation(kind, namespace, name, e));
                }
            }
        }
    }

    async fn scale_down_workload(
        &self,
        resource: &Workload,
    ) -> Result<(), ClusterError> {
        match resource.kind {
            WorkloadKind::Deployment => {
                let mut d = self
                    .cluster
                    .get_deployment(&resource.namespace, &resource.name)
                    .await?;
                let current =
                    d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
                if current == 0 {
                    warn!(
                        kind = %resource.kind,
                        name = %resource.name,
                        namespace = %resource.namespace,
                        "workload already scaled to zero; skipping"
                    );
                    return Ok(());
                }
                d.spec.get_or_insert_with(Default::default).replicas =
                    Some(0);
                stamp_scaled_down(&mut d.metadata, current);
                self.cluster
                    .update_deployment(&resource.namespace, &d)
                    .await?;
            }
            WorkloadKind::StatefulSet => {
                let mut s = self
                    .cluster
                    .get_statefulset(&resource.namespace, &resource.name)
                    .await?;
                let current =
                    s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(0);
                if current == 0 {
                    warn!(
                        kind = %resource.kind,
                        name = %resource.name,
                        namespace = %resource.namespace,
                        "workload already scaled to zero; skipping"
                    );
                    return Ok(());
                }
                s.spec.get_or_insert_with(Default::default).replicas =
                    Some(0);
                stamp_scaled_down(&mut s.metadata, current);
                self.cluster
                    .update_statefulset(&resource.namespace, &s)
                    .await?;
            }
        }
        Ok(())
    }

    async fn scale_up_workload(
        &self,
        resource: &Workload,
    ) -> Result<(), ClusterError> {
        match resource.kind {
            WorkloadKind::Deployment => {
                let mut d = self
                    .cluster
                    .get_deployment(&resource.namespace, &resource.name)
                    .await?;
                let Some(replicas) = take_original_replicas(
                    &mut d.metadata,
                    resource,
                )?
                else {
                    return Ok(());
                };
                d.spec.get_or_insert_with(Default::default).replicas =
                    Some(replicas);
                self.cluster
                    .update_deployment(&resource.namespace, &d)
                    .await?;
            }
            WorkloadKind::StatefulSet => {
                let mut s = self
                    .cluster
                    .get_statefulset(&resource.namespace, &resource.name)
                    .await?;
                let Some(replicas) = take_original_replicas(
                    &mut s.metadata,
                    resource,
                )?
                else {
                    return Ok(());
                };
                s.spec.get_or_insert_with(Default::default).replicas =
                    Some(replicas);
                self.cluster
                    .update_statefulset(&resource.namespace, &s)
                    .await?;
            }
        }
        Ok(())
    }
}

fn stamp_scaled_down(
    meta: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    original_replicas: i32,
) {
    let annotations = annotations_mut(meta);
    annotations.insert(
        ORIGINAL_REPLICAS_ANNOTATION.to_string(),
        original_replicas.to_string(),
    );
    annotations
        .insert(UPDATED_AT_ANNOTATION.to_string(), Utc::now().to_rfc3339());
}

/// Pop the recorded replica count off the object. `Ok(None)` means there is
/// nothing to undo: the workload was created, or already restored, after the
/// last scale-down.
fn take_original_replicas(
    meta: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    resource: &Workload,
) -> Result<Option<i32>, ClusterError> {
    let Some(raw) = meta
        .annotations
        .as_mut()
        .and_then(|a| a.remove(ORIGINAL_REPLICAS_ANNOTATION))
    else {
        warn!(
            key = ORIGINAL_REPLICAS_ANNOTATION,
            kind = %resource.kind,
            name = %resource.name,
            namespace = %resource.namespace,
            "original replicas annotation not set; the resource might have been created after the scaledown. Skipping"
        );
        return Ok(None);
    };

    let replicas: i32 = raw.parse().map_err(|e| {
        ClusterError::Malformed(format!(
            "parsing replica count from '{raw}': {e}"
        ))
    })?;

    annotations_mut(meta)
        .insert(UPDATED_AT_ANNOTATION.to_string(), Utc::now().to_rfc3339());
    Ok(Some(replicas))
}
