pub mod catalog;
mod cronjob;
mod reaper;
mod scaling;
mod wait;

pub use catalog::{
    StartupOrder, Workload, WorkloadKind, build_startup_order, sorted_groups,
};
pub use scaling::RetryPolicy;
pub use wait::{WaitGoal, WaitPolicy};


use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use crate::cluster::{ClusterError, ClusterOps};
use crate::config::{ScaleAction, ScalerConfig};

/// The controller's own name; objects labeled `app=env-scaler` are never
/// mutated, so the controller cannot suspend or reap itself.
pub const APP_NAME: &str = "env-scaler";
pub const APP_LABEL_KEY: &str = "app";

pub const STARTUP_ORDER_ANNOTATION: &str = "env-scaler/startup-order";
pub const ORIGINAL_REPLICAS_ANNOTATION: &str = "env-scaler/original-replicas";
pub const UPDATED_AT_ANNOTATION: &str = "env-scaler/updated-at";
pub const CRONJOB_WAS_DISABLED_ANNOTATION: &str =
    "env-scaler/cronjob-was-disabled";

/// Catch-all group for workloads without a valid startup-order annotation;
/// numerically above the valid 0-99 range so it boots last and stops first.
pub const DEFAULT_GROUP: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("listing {what}: {source}")]
    Discovery {
        what: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error("failed to update {kind} {name} in namespace {namespace}: {source}")]
    Mutation {
        kind: &'static str,
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("checking {kind} {name} in namespace {namespace}: {source}")]
    Status {
        kind: &'static str,
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("timed out waiting for group {group} workloads to become {goal}")]
    ConvergenceTimeout { group: u32, goal: WaitGoal },

    #[error("deleting pod {name} in namespace {namespace}: {source}")]
    PodDelete {
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },
}

impl ScaleError {
    pub(crate) fn mutation(
        kind: &'static str,
        namespace: &str,
        name: &str,
        source: ClusterError,
    ) -> Self {
        ScaleError::Mutation {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            source,
        }
    }
}

pub(crate) fn annotations_mut(
    meta: &mut ObjectMeta,
) -> &mut BTreeMap<String, String> {
    meta.annotations.get_or_insert_with(Default::default)
}

pub(crate) fn is_self_managed(meta: &ObjectMeta) -> bool {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(APP_LABEL_KEY))
        .map(String::as_str)
        == Some(APP_NAME)
}

/// One run of the ordered-group scaling engine. Groups are processed one at a
/// time, resources within a group one at a time; the only concurrency handled
/// is external writers, via conflict-retried updates.
pub struct Scaler<C> {
    pub(crate) cluster: C,
    pub(crate) cfg: ScalerConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) wait: WaitPolicy,
}

#[cfg(test)]
pub(crate) fn test_config(action: ScaleAction) -> ScalerConfig {
    ScalerConfig {
        action,
        suspend_cronjobs: true,
        skip_convergence_wait: true,
        wait_timeout_secs: 1,
        wait_interval_secs: 0,
        conflict_retries: 3,
    }
}

impl<C: ClusterOps> Scaler<C> {
    pub fn new(cluster: C, cfg: ScalerConfig) -> Self {
        let retry = RetryPolicy {
            attempts: cfg.conflict_retries.max(1),
            backoff: Duration::from_millis(100),
        };
        let wait = WaitPolicy {
            interval: Duration::from_secs(cfg.wait_interval_secs),
            timeout: Duration::from_secs(cfg.wait_timeout_secs),
        };
        Self {
            cluster,
            cfg,
            retry,
            wait,
        }
    }

    pub async fn run(&self) -> Result<(), ScaleError> {
        match self.cfg.action {
            ScaleAction::Up => self.scale_environment_up().await,
            ScaleAction::Down => self.scale_environment_down().await,
        }
    }

    async fn scale_environment_down(&self) -> Result<(), ScaleError> {
        info!("scaling environment down");

        if self.cfg.suspend_cronjobs {
            info!(
                app_label = APP_NAME,
                "suspending all cronjobs except the ones which manage this app"
            );
            self.update_cron_jobs().await?;
        }

        let mut order = build_startup_order(&self.cluster).await?;
        let groups = sorted_groups(&order, ScaleAction::Down);
        debug!(?groups, "scale down order");

        for group in groups {
            info!(group, "scaling down group");
            let Some(resources) = order.get_mut(&group) else {
                continue;
            };
            self.scale_down_group(resources).await?;
            if !self.cfg.skip_convergence_wait {
                wait::wait_for_termination(
                    &self.cluster,
                    &self.wait,
                    group,
                    resources,
                )
                .await?;
            }
        }

        info!("terminating standalone pods");
        self.terminate_standalone_pods().await?;

        Ok(())
    }

    async fn scale_environment_up(&self) -> Result<(), ScaleError> {
        info!("scaling environment up");

        if self.cfg.suspend_cronjobs {
            info!(
                app_label = APP_NAME,
                "resuming all cronjobs except the ones which manage this app or were previously suspended"
            );
            self.update_cron_jobs().await?;
        }

        let mut order = build_startup_order(&self.cluster).await?;
        let groups = sorted_groups(&order, ScaleAction::Up);
        debug!(?groups, "scale up order");

        for group in groups {
            info!(group, "scaling up group");
            let Some(resources) = order.get_mut(&group) else {
                continue;
            };
            self.scale_up_group(resources).await?;
            if !self.cfg.skip_convergence_wait {
                wait::wait_for_readiness(
                    &self.cluster,
                    &self.wait,
                    group,
                    resources,
                )
                .await?;
            }
        }

        Ok(())
    }
}
