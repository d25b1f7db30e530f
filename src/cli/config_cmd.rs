use anyhow::Result;

use crate::cli::output::OutputOptions;
use crate::core::config::AppConfig;

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match AppConfig::default().save() {
        Ok(path) => {
            println!("Generated config at {}", path.display());
            println!("  Fill in the azure/gcp identifiers and the [e2e] section before running checks.");
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `failcheck config init` to create one.");
        return Ok(());
    }

    match AppConfig::load() {
        Ok(config) => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("Config at {} is valid", path.display());
            } else {
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
                eprintln!("{} issue(s) found", issues.len());
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
