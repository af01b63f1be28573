use envconfig::Envconfig;
use kube::Client;
use tracing::{error, info};

use env_scaler::cluster::KubeCluster;
use env_scaler::config::ScalerConfig;
use env_scaler::engine::Scaler;
use env_scaler::init_tracing;
use env_scaler::notify::SlackNotifier;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing("info");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    // This avoids runtime errors when no default provider is set.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let notifier = SlackNotifier::from_env();

    let cfg = match ScalerConfig::init_from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "loading config");
            notify(&notifier, &format!("error whilst loading config: {e}"))
                .await;
            std::process::exit(1);
        }
    };
    info!(?cfg, "starting env-scaler");

    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "creating cluster client");
            notify(
                &notifier,
                &format!("error whilst creating the cluster client: {e}"),
            )
            .await;
            std::process::exit(2);
        }
    };

    let scaler = Scaler::new(KubeCluster::new(client), cfg);
    if let Err(e) = scaler.run().await {
        error!(error = %e, "run failed");
        notify(
            &notifier,
            &format!("error whilst scaling the environment: {e}"),
        )
        .await;
        std::process::exit(3);
    }
}

async fn notify(notifier: &Option<SlackNotifier>, message: &str) {
    if let Some(n) = notifier {
        n.notify_failure(message).await;
    }
}
