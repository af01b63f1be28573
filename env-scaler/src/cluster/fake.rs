//! In-memory stand-in for the cluster API, used by the engine unit tests.
//! Mirrors apiserver update semantics closely enough for the engine: updates
//! check resourceVersion, bump it on success, and conflicts or hard failures
//! can be injected per object kind.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta, OwnerReference,
};

use super::{ClusterError, ClusterOps};

type Key = (String, String); // (namespace, name)

#[derive(Default)]
struct State {
    deployments: BTreeMap<Key, Deployment>,
    statefulsets: BTreeMap<Key, StatefulSet>,
    cronjobs: BTreeMap<Key, CronJob>,
    pods: BTreeMap<Key, Pod>,
    // Remaining injected conflicts per (kind, namespace/name).
    conflicts: BTreeMap<(String, Key), u32>,
    // Kind whose updates fail unconditionally with an api error.
    fail_updates: Option<String>,
    // "kind/namespace/name" per successful mutation, in order.
    mutation_log: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_deployment(&self, d: Deployment) {
        let mut st = self.state.lock().unwrap();
        st.deployments.insert(key(&d.metadata), d);
    }

    pub fn put_statefulset(&self, s: StatefulSet) {
        let mut st = self.state.lock().unwrap();
        st.statefulsets.insert(key(&s.metadata), s);
    }

    pub fn put_cronjob(&self, cj: CronJob) {
        let mut st = self.state.lock().unwrap();
        st.cronjobs.insert(key(&cj.metadata), cj);
    }

    pub fn put_pod(&self, p: Pod) {
        let mut st = self.state.lock().unwrap();
        st.pods.insert(key(&p.metadata), p);
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let st = self.state.lock().unwrap();
        st.deployments.get(&owned(namespace, name)).cloned()
    }

    pub fn statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<StatefulSet> {
        let st = self.state.lock().unwrap();
        st.statefulsets.get(&owned(namespace, name)).cloned()
    }

    pub fn cronjob(&self, namespace: &str, name: &str) -> Option<CronJob> {
        let st = self.state.lock().unwrap();
        st.cronjobs.get(&owned(namespace, name)).cloned()
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        let st = self.state.lock().unwrap();
        st.pods.get(&owned(namespace, name)).cloned()
    }

    /// The next `count` updates of the given object are rejected with a
    /// version conflict, simulating a concurrent external writer.
    pub fn inject_conflicts(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        count: u32,
    ) {
        let mut st = self.state.lock().unwrap();
        st.conflicts
            .insert((kind.to_string(), owned(namespace, name)), count);
    }

    /// Every update of the given kind fails with a non-conflict api error.
    pub fn fail_updates(&self, kind: &str) {
        let mut st = self.state.lock().unwrap();
        st.fail_updates = Some(kind.to_string());
    }

    pub fn mutation_log(&self) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.mutation_log.clone()
    }
}

fn key(meta: &ObjectMeta) -> Key {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn owned(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn ident(kind: &str, k: &Key) -> String {
    format!("{}/{}/{}", kind, k.0, k.1)
}

fn bump_version(meta: &mut ObjectMeta) {
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    meta.resource_version = Some(next.to_string());
}

impl State {
    fn check_update(
        &mut self,
        kind: &str,
        k: &Key,
        stored_version: Option<&str>,
        incoming_version: Option<&str>,
    ) -> Result<(), ClusterError> {
        if self.fail_updates.as_deref() == Some(kind) {
            return Err(ClusterError::Api("server side error".to_string()));
        }
        let conflict_key = (kind.to_string(), k.clone());
        if let Some(remaining) = self.conflicts.get_mut(&conflict_key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClusterError::Conflict(format!(
                    "the object has been modified: {}",
                    ident(kind, k)
                )));
            }
        }
        if stored_version != incoming_version {
            return Err(ClusterError::Conflict(format!(
                "resourceVersion mismatch: {}",
                ident(kind, k)
            )));
        }
        Ok(())
    }
}

// Simple equality matching is all the engine-built selectors need: "k=v"
// terms joined by commas, bare keys meaning existence.
fn selector_matches(
    selector: &str,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    selector
        .split(',')
        .filter(|t| !t.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => {
                labels.and_then(|l| l.get(k)).map(String::as_str) == Some(v)
            }
            None => labels.is_some_and(|l| l.contains_key(term)),
        })
}

#[async_trait]
impl ClusterOps for FakeCluster {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError> {
        let st = self.state.lock().unwrap();
        Ok(st.deployments.values().cloned().collect())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, ClusterError> {
        self.deployment(namespace, name).ok_or_else(|| {
            ClusterError::NotFound(format!(
                "deployment {namespace}/{name} not found"
            ))
        })
    }

    async fn update_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let mut st = self.state.lock().unwrap();
        let k = owned(
            namespace,
            deployment.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored_version = st
            .deployments
            .get(&k)
            .and_then(|d| d.metadata.resource_version.clone());
        st.check_update(
            "deployment",
            &k,
            stored_version.as_deref(),
            deployment.metadata.resource_version.as_deref(),
        )?;
        let mut updated = deployment.clone();
        bump_version(&mut updated.metadata);
        st.deployments.insert(k.clone(), updated.clone());
        let entry = ident("deployment", &k);
        st.mutation_log.push(entry);
        Ok(updated)
    }

    async fn list_statefulsets(
        &self,
    ) -> Result<Vec<StatefulSet>, ClusterError> {
        let st = self.state.lock().unwrap();
        Ok(st.statefulsets.values().cloned().collect())
    }

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, ClusterError> {
        self.statefulset(namespace, name).ok_or_else(|| {
            ClusterError::NotFound(format!(
                "statefulset {namespace}/{name} not found"
            ))
        })
    }

    async fn update_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> Result<StatefulSet, ClusterError> {
        let mut st = self.state.lock().unwrap();
        let k = owned(
            namespace,
            statefulset.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored_version = st
            .statefulsets
            .get(&k)
            .and_then(|s| s.metadata.resource_version.clone());
        st.check_update(
            "statefulset",
            &k,
            stored_version.as_deref(),
            statefulset.metadata.resource_version.as_deref(),
        )?;
        let mut updated = statefulset.clone();
        bump_version(&mut updated.metadata);
        st.statefulsets.insert(k.clone(), updated.clone());
        let entry = ident("statefulset", &k);
        st.mutation_log.push(entry);
        Ok(updated)
    }

    async fn list_cronjobs(&self) -> Result<Vec<CronJob>, ClusterError> {
        let st = self.state.lock().unwrap();
        Ok(st.cronjobs.values().cloned().collect())
    }

    async fn get_cronjob(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronJob, ClusterError> {
        self.cronjob(namespace, name).ok_or_else(|| {
            ClusterError::NotFound(format!(
                "cronjob {namespace}/{name} not found"
            ))
        })
    }

    async fn update_cronjob(
        &self,
        namespace: &str,
        cronjob: &CronJob,
    ) -> Result<CronJob, ClusterError> {
        let mut st = self.state.lock().unwrap();
        let k = owned(
            namespace,
            cronjob.metadata.name.as_deref().unwrap_or_default(),
        );
        let stored_version = st
            .cronjobs
            .get(&k)
            .and_then(|c| c.metadata.resource_version.clone());
        st.check_update(
            "cronjob",
            &k,
            stored_version.as_deref(),
            cronjob.metadata.resource_version.as_deref(),
        )?;
        let mut updated = cronjob.clone();
        bump_version(&mut updated.metadata);
        st.cronjobs.insert(k.clone(), updated.clone());
        let entry = ident("cronjob", &k);
        st.mutation_log.push(entry);
        Ok(updated)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let st = self.state.lock().unwrap();
        Ok(st
            .pods
            .values()
            .filter(|p| {
                p.metadata.namespace.as_deref() == Some(namespace)
                    && label_selector.is_none_or(|sel| {
                        selector_matches(sel, p.metadata.labels.as_ref())
                    })
            })
            .cloned()
            .collect())
    }

    async fn list_all_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        let st = self.state.lock().unwrap();
        Ok(st.pods.values().cloned().collect())
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut st = self.state.lock().unwrap();
        if st.fail_updates.as_deref() == Some("pod") {
            return Err(ClusterError::Api("server side error".to_string()));
        }
        let k = owned(namespace, name);
        if st.pods.remove(&k).is_none() {
            return Err(ClusterError::NotFound(format!(
                "pod {namespace}/{name} not found"
            )));
        }
        let entry = format!("delete-pod/{namespace}/{name}");
        st.mutation_log.push(entry);
        Ok(())
    }
}

// Object builders shared by the engine tests.

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

pub(crate) fn deployment(
    namespace: &str,
    name: &str,
    replicas: i32,
) -> Deployment {
    Deployment {
        metadata: meta(namespace, name),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    name.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn statefulset(
    namespace: &str,
    name: &str,
    replicas: i32,
) -> StatefulSet {
    StatefulSet {
        metadata: meta(namespace, name),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    name.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn cronjob(
    namespace: &str,
    name: &str,
    suspended: bool,
) -> CronJob {
    CronJob {
        metadata: meta(namespace, name),
        spec: Some(CronJobSpec {
            schedule: "*/5 * * * *".to_string(),
            suspend: Some(suspended),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn pod(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
) -> Pod {
    let mut p = Pod {
        metadata: meta(namespace, name),
        ..Default::default()
    };
    if !labels.is_empty() {
        p.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    p
}

pub(crate) fn owned_pod(
    namespace: &str,
    name: &str,
    owner_kind: &str,
    labels: &[(&str, &str)],
) -> Pod {
    let mut p = pod(namespace, name, labels);
    p.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: owner_kind.to_string(),
        name: format!("{name}-owner"),
        uid: "0000-0000".to_string(),
        ..Default::default()
    }]);
    p
}
