mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::KubeCluster;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Pod;

/// Errors surfaced by the cluster API seam. Conflicts are the only class the
/// engine retries; everything else is fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed object data: {0}")]
    Malformed(String),

    #[error("cluster api error: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}

/// The cluster API surface the engine consumes: list/get/update/delete on the
/// four resource kinds it manages. Production runs go through [`KubeCluster`];
/// tests use an in-memory fake with injectable conflicts.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError>;
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, ClusterError>;
    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;

    async fn list_statefulsets(&self)
    -> Result<Vec<StatefulSet>, ClusterError>;
    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, ClusterError>;
    async fn update_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> Result<StatefulSet, ClusterError>;

    async fn list_cronjobs(&self) -> Result<Vec<CronJob>, ClusterError>;
    async fn get_cronjob(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronJob, ClusterError>;
    async fn update_cronjob(
        &self,
        namespace: &str,
        cronjob: &CronJob,
    ) -> Result<CronJob, ClusterError>;

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError>;
    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError>;
    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;
}
