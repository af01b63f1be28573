use serde_json::json;
use tracing::warn;

/// Best-effort Slack failure notifications via an incoming webhook. Absent
/// when the webhook env vars are not set; callers hold an `Option` and skip
/// the call. A failed notification is logged and never escalates the run's
/// own exit status.
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
    environment: String,
    action: String,
}

impl SlackNotifier {
    pub fn from_env() -> Option<Self> {
        let webhook_url = std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default();
        let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
        let action = std::env::var("SCALE_ACTION").unwrap_or_default();

        if webhook_url.is_empty() || environment.is_empty() {
            warn!(
                "SLACK_WEBHOOK_URL and/or ENVIRONMENT envar(s) not set; disabling Slack notifications"
            );
            return None;
        }

        Some(Self {
            http: reqwest::Client::new(),
            webhook_url,
            environment,
            action,
        })
    }

    pub async fn notify_failure(&self, message: &str) {
        let payload = json!({
            "text": "A problem has occurred whilst scaling the environment",
            "attachments": [{
                "fields": [
                    { "title": "Environment", "value": self.environment.as_str() },
                    { "title": "Scaling Type", "value": self.action.as_str() },
                    { "title": "Error", "value": message },
                ],
            }],
        });

        match self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "slack webhook rejected the notification");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "sending slack notification"),
        }
    }
}
