use chrono::Utc;
use tracing::{debug, warn};

use super::{
    CRONJOB_WAS_DISABLED_ANNOTATION, ScaleError, Scaler,
    UPDATED_AT_ANNOTATION, annotations_mut, is_self_managed,
};
use crate::cluster::{ClusterError, ClusterOps};
use crate::config::ScaleAction;

impl<C: ClusterOps> Scaler<C> {
    /// Suspend (down) or resume (up) every CronJob in the cluster, except the
    /// ones that manage this controller itself. A job that was already
    /// suspended before a scale-down is marked so a later scale-up leaves it
    /// suspended. Updates are only submitted when something actually changes.
    pub(crate) async fn update_cron_jobs(&self) -> Result<(), ScaleError> {
        let cronjobs =
            self.cluster
                .list_cronjobs()
                .await
                .map_err(|e| ScaleError::Discovery {
                    what: "cronjobs",
                    source: e,
                })?;

        for cj in cronjobs {
            let name = cj.metadata.name.clone().unwrap_or_default();
            let namespace = cj.metadata.namespace.clone().unwrap_or_default();
            self.retry_on_conflict("cronjob", &namespace, &name, || {
                self.update_cron_job(&namespace, &name)
            })
            .await?;
        }

        Ok(())
    }

    async fn update_cron_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut cj = self.cluster.get_cronjob(namespace, name).await?;

        if is_self_managed(&cj.metadata) {
            debug!(
                name,
                namespace, "skipping cronjob that manages this app"
            );
            return Ok(());
        }

        let suspended =
            cj.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false);
        let previously_disabled = cj
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CRONJOB_WAS_DISABLED_ANNOTATION))
            .map(String::as_str)
            == Some("yes");

        let mut changed = false;
        match self.cfg.action {
            ScaleAction::Up => {
                // Do not resume anything that was suspended before the last
                // scale-down.
                if previously_disabled {
                    warn!(
                        name,
                        namespace,
                        "cronjob was previously suspended; leaving it suspended"
                    );
                    return Ok(());
                }
                if suspended {
                    cj.spec.get_or_insert_with(Default::default).suspend =
                        Some(false);
                    changed = true;
                }
            }
            ScaleAction::Down => {
                if suspended {
                    if !previously_disabled {
                        warn!(
                            name,
                            namespace,
                            "cronjob is already suspended; marking it so the scaleup run does not resume it"
                        );
                        annotations_mut(&mut cj.metadata).insert(
                            CRONJOB_WAS_DISABLED_ANNOTATION.to_string(),
                            "yes".to_string(),
                        );
                        changed = true;
                    }
                } else {
                    cj.spec.get_or_insert_with(Default::default).suspend =
                        Some(true);
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(());
        }

        annotations_mut(&mut cj.metadata)
            .insert(UPDATED_AT_ANNOTATION.to_string(), Utc::now().to_rfc3339());
        self.cluster.update_cronjob(namespace, &cj).await?;
        debug!(name, namespace, action = %self.cfg.action, "cronjob updated");
        Ok(())
    }
}
