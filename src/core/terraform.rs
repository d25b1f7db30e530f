use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::core::process;

/// A terraform invocation target: the module directory plus the `-var`
/// assignments every mutating command carries.
#[derive(Debug, Clone)]
pub struct TerraformOptions {
    pub dir: PathBuf,
    pub vars: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl TerraformOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            vars: BTreeMap::new(),
            // Provisioning a multi-region deployment routinely takes tens of
            // minutes.
            timeout: Duration::from_secs(45 * 60),
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

fn var_args(vars: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = Vec::with_capacity(vars.len() * 2);
    for (key, value) in vars {
        args.push("-var".to_string());
        args.push(format!("{}={}", key, value));
    }
    args
}

async fn run(opts: &TerraformOptions, base: &[&str], with_vars: bool) -> Result<String> {
    let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    if with_vars {
        args.extend(var_args(&opts.vars));
    }
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    process::run_command_in("terraform", &arg_refs, &opts.dir, opts.timeout)
        .await
        .with_context(|| format!("terraform {} failed in {}", base.join(" "), opts.dir.display()))
}

pub async fn init(opts: &TerraformOptions) -> Result<()> {
    info!(dir = %opts.dir.display(), "terraform init");
    run(opts, &["init", "-input=false"], false).await?;
    Ok(())
}

pub async fn apply(opts: &TerraformOptions) -> Result<()> {
    info!(dir = %opts.dir.display(), "terraform apply");
    run(opts, &["apply", "-auto-approve", "-input=false"], true).await?;
    Ok(())
}

pub async fn destroy(opts: &TerraformOptions) -> Result<()> {
    info!(dir = %opts.dir.display(), "terraform destroy");
    run(opts, &["destroy", "-auto-approve", "-input=false"], true).await?;
    Ok(())
}

/// One named output, decoded from `terraform output -json`.
pub async fn output(opts: &TerraformOptions, name: &str) -> Result<serde_json::Value> {
    let stdout = run(opts, &["output", "-json", name], false).await?;
    serde_json::from_str(&stdout)
        .with_context(|| format!("terraform output {} is not valid JSON", name))
}

/// Render a regions slice as the `["a", "b"]` list literal the module
/// variables expect.
pub fn region_list(regions: &[String]) -> String {
    let quoted: Vec<String> = regions.iter().map(|r| format!("\"{}\"", r)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_args_are_sorted_pairs() {
        let opts = TerraformOptions::new("/tmp/tf")
            .var("prefix", "test")
            .var("gcp_project", "my-project");
        let args = var_args(&opts.vars);
        assert_eq!(
            args,
            vec!["-var", "gcp_project=my-project", "-var", "prefix=test"]
        );
    }

    #[test]
    fn var_overwrites_previous_value() {
        let opts = TerraformOptions::new("/tmp/tf")
            .var("prefix", "old")
            .var("prefix", "new");
        assert_eq!(var_args(&opts.vars), vec!["-var", "prefix=new"]);
    }

    #[test]
    fn region_list_literal() {
        let regions = vec!["us-east1".to_string(), "us-west1".to_string()];
        assert_eq!(region_list(&regions), "[\"us-east1\", \"us-west1\"]");
    }

    #[test]
    fn region_list_single_region() {
        assert_eq!(region_list(&["us-east1".to_string()]), "[\"us-east1\"]");
    }

    #[test]
    fn region_list_empty() {
        assert_eq!(region_list(&[]), "[]");
    }
}
