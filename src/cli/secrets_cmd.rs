use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::azure::{vault, AzureClient};
use crate::core::config::AppConfig;
use crate::core::naming;

/// Enumerate the deployment vault and verify the expected validator-key
/// secrets against it.
pub async fn run(opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let prefix = config.prefix()?;
    let resource_group = config.azure_resource_group()?;

    let expected = naming::expected_validator_secrets(&config.e2e.validator_keys);
    if expected.is_empty() {
        anyhow::bail!(
            "no validator keys configured; add [e2e.validator_keys.<slot>] sections to the config"
        );
    }

    let client = AzureClient::from_config(&config)?;
    let items = vault::vault_secrets(&client, &resource_group, &prefix).await?;

    match naming::verify_secrets(&items, &expected) {
        Ok(()) => {
            match opts.format {
                OutputFormat::Json => {
                    let names: Vec<&str> = expected.iter().map(|e| e.name.as_str()).collect();
                    println!("{}", serde_json::json!({ "verified": names }));
                }
                OutputFormat::Text => {
                    println!(
                        "{} secret(s) verified against {} vault entries",
                        expected.len(),
                        items.len()
                    );
                }
            }
            Ok(())
        }
        Err(problems) => {
            for problem in &problems {
                eprintln!("{}", problem);
            }
            anyhow::bail!("{} secret(s) failed verification", problems.len());
        }
    }
}
