use std::fmt;
use std::str::FromStr;

use envconfig::Envconfig;

/// Direction of a single run. A run performs exactly one direction and exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleAction {
    Up,
    Down,
}

impl FromStr for ScaleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "scaleup" => Ok(ScaleAction::Up),
            "down" | "scaledown" => Ok(ScaleAction::Down),
            other => Err(format!(
                "invalid scale action '{other}': must be 'up' or 'down'. Ensure SCALE_ACTION is set correctly"
            )),
        }
    }
}

impl fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleAction::Up => write!(f, "up"),
            ScaleAction::Down => write!(f, "down"),
        }
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct ScalerConfig {
    /// Env: SCALE_ACTION ("up" or "down"). Mandatory; validated before any
    /// mutation is attempted.
    #[envconfig(from = "SCALE_ACTION")]
    pub action: ScaleAction,

    /// Suspend (down) / resume (up) CronJobs as part of the run.
    /// Env: SUSPEND_CRONJOBS
    #[envconfig(from = "SUSPEND_CRONJOBS", default = "true")]
    pub suspend_cronjobs: bool,

    /// Skip waiting for the cluster to converge after each group mutation.
    /// Env: SKIP_CONVERGENCE_WAIT
    #[envconfig(from = "SKIP_CONVERGENCE_WAIT", default = "false")]
    pub skip_convergence_wait: bool,

    /// Overall deadline for each per-group convergence wait.
    /// Env: WAIT_TIMEOUT_SECS
    #[envconfig(from = "WAIT_TIMEOUT_SECS", default = "900")]
    pub wait_timeout_secs: u64,

    /// Poll interval during convergence waits.
    /// Env: WAIT_INTERVAL_SECS
    #[envconfig(from = "WAIT_INTERVAL_SECS", default = "2")]
    pub wait_interval_secs: u64,

    /// Bounded attempts for updates rejected with a version conflict.
    /// Env: CONFLICT_RETRIES
    #[envconfig(from = "CONFLICT_RETRIES", default = "5")]
    pub conflict_retries: u32,
}
