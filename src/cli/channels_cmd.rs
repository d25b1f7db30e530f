use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;
use crate::core::gcp::channels;

/// Delete the deployment's monitoring notification channels. With
/// `--dry-run`, only report what would be deleted.
pub async fn clean(dry_run: bool, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let project = config.gcp_project()?;
    let prefix = config.prefix()?;

    let matched = channels::clean(&project, &prefix, dry_run).await?;

    match opts.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({ "matched": matched, "dry_run": dry_run })
            );
        }
        OutputFormat::Text => {
            if dry_run {
                println!("{} notification channel(s) would be deleted", matched);
            } else {
                println!("{} notification channel(s) cleaned up", matched);
            }
        }
    }
    Ok(())
}
