use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::azure::{metrics, AzureClient};
use crate::core::config::AppConfig;

/// Poll until the metric definition is stably published on every scale set.
pub async fn run(
    scale_sets: Vec<String>,
    metric: String,
    namespace: String,
    period_secs: u64,
    attempts: u32,
    timeout_secs: Option<u64>,
    opts: &OutputOptions,
) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let resource_group = config.azure_resource_group()?;
    let client = AzureClient::from_config(&config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; cancelling metric polling");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "deadline reached; cancelling metric polling");
            cancel.cancel();
        });
    }

    info!(
        %metric,
        %namespace,
        scale_sets = scale_sets.len(),
        period_secs,
        attempts,
        "waiting for metric definitions"
    );
    let resolved = metrics::wait_metric_definitions(
        &client,
        &resource_group,
        &scale_sets,
        &metric,
        &namespace,
        Duration::from_secs(period_secs),
        attempts,
        &cancel,
    )
    .await?;

    match opts.format {
        OutputFormat::Json => {
            let json = if opts.pretty {
                serde_json::to_string_pretty(&resolved)?
            } else {
                serde_json::to_string(&resolved)?
            };
            println!("{}", json);
        }
        OutputFormat::Text => {
            let mut names: Vec<&String> = resolved.keys().collect();
            names.sort();
            for name in names {
                println!("{}  {}", name, resolved[name]);
            }
        }
    }
    Ok(())
}
