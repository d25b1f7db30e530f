use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};

use crate::cli::output::OutputOptions;
use crate::core::azure::{vault, AzureClient};
use crate::core::config::{self, AppConfig, ValidatorKey};
use crate::core::gcp::channels;
use crate::core::health::{self, SshSession};
use crate::core::naming;
use crate::core::terraform::{self, TerraformOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Azure,
    Gcp,
}

impl Platform {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "azure" => Some(Self::Azure),
            "gcp" | "google" => Some(Self::Gcp),
            _ => None,
        }
    }
}

/// Render the validator_keys module variable:
/// `{key1={key="0x..",type="gran",seed=".."},..}`.
fn validator_keys_var(keys: &BTreeMap<String, ValidatorKey>) -> String {
    let entries: Vec<String> = keys
        .iter()
        .map(|(slot, key)| {
            format!(
                r#"{}={{key="{}",type="{}",seed="{}"}}"#,
                slot, key.key, key.key_type, key.seed
            )
        })
        .collect();
    format!("{{{}}}", entries.join(","))
}

fn terraform_options(
    platform: Platform,
    config: &AppConfig,
    prefix: &str,
    public_key: &str,
) -> Result<TerraformOptions> {
    let e2e = &config.e2e;
    let mut tf = TerraformOptions::new(e2e.terraform_dir.clone())
        .var("prefix", prefix)
        .var("validator_name", &e2e.validator_name)
        .var("cpu_limit", &e2e.cpu_limit)
        .var("ram_limit", &e2e.ram_limit)
        .var("chain", &e2e.chain)
        .var("expose_ssh", if e2e.expose_ssh { "true" } else { "false" })
        .var(
            "delete_on_termination",
            if e2e.delete_on_termination { "true" } else { "false" },
        )
        .var("validator_keys", validator_keys_var(&e2e.validator_keys));
    if let Some(node_key) = &e2e.node_key {
        tf = tf.var("node_key", node_key);
    }
    if let Some(admin_email) = &e2e.admin_email {
        tf = tf.var("admin_email", admin_email);
    }

    let regions = terraform::region_list(&e2e.regions);
    tf = match platform {
        Platform::Gcp => tf
            .var("gcp_regions", regions)
            .var("gcp_project", config.gcp_project()?)
            .var("gcp_ssh_user", &e2e.ssh_user)
            .var("gcp_ssh_pub_key", public_key),
        Platform::Azure => tf
            .var("azure_regions", regions)
            .var("azure_rg", config.azure_resource_group()?)
            .var("azure_ssh_user", &e2e.ssh_user)
            .var("azure_ssh_pub_key", public_key),
    };
    Ok(tf)
}

/// Provision the deployment, validate it end to end, and tear it down.
/// Check failures are reported only after the deferred destroy has run.
pub async fn run(platform: String, opts: &OutputOptions) -> Result<()> {
    let Some(platform) = Platform::from_id(&platform) else {
        eprintln!("Unknown platform: '{}' (use azure|gcp)", platform);
        std::process::exit(1);
    };

    if crate::core::process::which("terraform").is_none() {
        anyhow::bail!("terraform not found in PATH");
    }

    let config = AppConfig::load().unwrap_or_default();
    let issues = config.validate();
    if !issues.is_empty() {
        anyhow::bail!("invalid config: {}", issues.join("; "));
    }
    let prefix = config.prefix()?;

    let scratch = std::env::temp_dir().join(format!("failcheck-e2e-{}", std::process::id()));
    let (key_path, public_key) = health::generate_ssh_keypair(&scratch).await?;

    let tf = terraform_options(platform, &config, &prefix, &public_key)?;

    if platform == Platform::Gcp && !config::skip_channel_cleanup() {
        let project = config.gcp_project()?;
        let cleaned = channels::clean(&project, &prefix, false)
            .await
            .context("pre-run notification channel cleanup failed")?;
        info!(cleaned, "pre-run notification channel cleanup done");
    }

    terraform::init(&tf).await?;
    if config::force_initial_cleanup() {
        info!("running initial terraform cleanup");
        terraform::destroy(&tf).await?;
    } else {
        info!("skipping initial terraform cleanup");
    }
    terraform::apply(&tf).await?;

    let outcome = run_checks(platform, &config, &prefix, &tf, &key_path).await;

    if config::skip_post_cleanup() {
        info!("skipping deferred terraform cleanup");
    } else if let Err(err) = terraform::destroy(&tf).await {
        error!(error = %err, "deferred terraform destroy failed");
    }

    outcome?;
    if opts.verbose {
        info!("all end-to-end checks passed");
    }
    println!("e2e scenario passed");
    Ok(())
}

async fn run_checks(
    platform: Platform,
    config: &AppConfig,
    prefix: &str,
    tf: &TerraformOptions,
    key_path: &Path,
) -> Result<()> {
    let value = terraform::output(tf, "instance_ips").await?;
    let ips: Vec<String> =
        serde_json::from_value(value).context("instance_ips output must be a list of strings")?;
    if ips.is_empty() {
        anyhow::bail!("no instances found in terraform outputs");
    }
    info!(ips = ?ips, "discovered instance IPs");

    health::check_instance_count(ips.len())?;
    info!(count = ips.len(), "instance count check passed: odd and viable");

    let session = SshSession {
        user: config.e2e.ssh_user.clone(),
        key_file: key_path.to_path_buf(),
    };
    health::consul_lock_check(&session, &ips, &config.e2e.chain).await?;
    health::consul_members_check(&session, &ips).await?;
    health::leader_check(&session, &ips).await?;
    health::node_health_check(&session, &ips).await?;

    if platform == Platform::Azure {
        let expected = naming::expected_validator_secrets(&config.e2e.validator_keys);
        if expected.is_empty() {
            warn!("no validator keys configured; skipping secret verification");
        } else {
            let resource_group = config.azure_resource_group()?;
            let client = AzureClient::from_config(config)?;
            let items = vault::vault_secrets(&client, &resource_group, prefix).await?;
            naming::verify_secrets(&items, &expected).map_err(|problems| {
                anyhow::anyhow!("secret verification failed: {}", problems.join("; "))
            })?;
            info!(secrets = expected.len(), "vault secret check passed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_from_id() {
        assert_eq!(Platform::from_id("azure"), Some(Platform::Azure));
        assert_eq!(Platform::from_id("GCP"), Some(Platform::Gcp));
        assert_eq!(Platform::from_id("google"), Some(Platform::Gcp));
        assert_eq!(Platform::from_id("aws"), None);
    }

    #[test]
    fn validator_keys_literal_matches_module_format() {
        let mut keys = BTreeMap::new();
        keys.insert(
            "key1".to_string(),
            ValidatorKey {
                key: "0x6ce9".to_string(),
                key_type: "gran".to_string(),
                seed: "favorite liar zebra".to_string(),
            },
        );
        keys.insert(
            "key2".to_string(),
            ValidatorKey {
                key: "0x3ff0".to_string(),
                key_type: "aura".to_string(),
                seed: "expire stage crawl".to_string(),
            },
        );
        assert_eq!(
            validator_keys_var(&keys),
            r#"{key1={key="0x6ce9",type="gran",seed="favorite liar zebra"},key2={key="0x3ff0",type="aura",seed="expire stage crawl"}}"#
        );
    }

    #[test]
    fn validator_keys_literal_empty() {
        assert_eq!(validator_keys_var(&BTreeMap::new()), "{}");
    }

    #[test]
    fn gcp_vars_carry_project_and_regions() {
        std::env::set_var("GCP_PROJECT", "proj-123");
        let config = AppConfig::default();
        let tf = terraform_options(Platform::Gcp, &config, "test", "ssh-rsa AAAA").unwrap();
        std::env::remove_var("GCP_PROJECT");
        assert_eq!(tf.vars["gcp_project"], "proj-123");
        assert_eq!(tf.vars["prefix"], "test");
        assert!(tf.vars["gcp_regions"].starts_with("[\"us-east1\""));
        assert_eq!(tf.vars["gcp_ssh_pub_key"], "ssh-rsa AAAA");
        assert!(!tf.vars.contains_key("node_key"));
    }
}
