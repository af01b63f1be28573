use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};

use super::{ClusterError, ClusterOps};

/// Production implementation of [`ClusterOps`] backed by a kube client.
/// Updates go through `replace`, so the object's resourceVersion carries the
/// optimistic-concurrency check and a stale write comes back as a conflict.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn classify(e: kube::Error) -> ClusterError {
    match &e {
        kube::Error::Api(ae) if ae.code == 409 => {
            ClusterError::Conflict(ae.message.clone())
        }
        kube::Error::Api(ae) if ae.code == 404 => {
            ClusterError::NotFound(ae.message.clone())
        }
        _ => ClusterError::Api(e.to_string()),
    }
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError> {
        let api: Api<Deployment> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, ClusterError> {
        let api: Api<Deployment> =
            Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(classify)
    }

    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let api: Api<Deployment> =
            Api::namespaced(self.client.clone(), namespace);
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        api.replace(name, &PostParams::default(), deployment)
            .await
            .map_err(classify)
    }

    async fn list_statefulsets(
        &self,
    ) -> Result<Vec<StatefulSet>, ClusterError> {
        let api: Api<StatefulSet> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, ClusterError> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(classify)
    }

    async fn update_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> Result<StatefulSet, ClusterError> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), namespace);
        let name = statefulset.metadata.name.as_deref().unwrap_or_default();
        api.replace(name, &PostParams::default(), statefulset)
            .await
            .map_err(classify)
    }

    async fn list_cronjobs(&self) -> Result<Vec<CronJob>, ClusterError> {
        let api: Api<CronJob> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn get_cronjob(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronJob, ClusterError> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(classify)
    }

    async fn update_cronjob(
        &self,
        namespace: &str,
        cronjob: &CronJob,
    ) -> Result<CronJob, ClusterError> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        let name = cronjob.metadata.name.as_deref().unwrap_or_default();
        api.replace(name, &PostParams::default(), cronjob)
            .await
            .map_err(classify)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        let list = api.list(&lp).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(classify)?;
        Ok(())
    }
}
