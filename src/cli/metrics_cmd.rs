use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::azure::{metrics, AzureClient};
use crate::core::config::AppConfig;
use crate::core::models::metric::{Aggregation, MetricSample};

fn render_sample(sample: &Option<MetricSample>, aggregation: Aggregation) -> String {
    match sample {
        Some(sample) => {
            let value = sample
                .value(aggregation)
                .map(|v| format!("{}", v))
                .unwrap_or_else(|| "-".to_string());
            let at = sample
                .time_stamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            format!("{} = {} @ {}", aggregation.as_str(), value, at)
        }
        None => "no data".to_string(),
    }
}

pub async fn run(
    scale_sets: Vec<String>,
    metric: String,
    namespace: String,
    aggregation: String,
    opts: &OutputOptions,
) -> Result<()> {
    let Some(aggregation) = Aggregation::from_id(&aggregation) else {
        eprintln!(
            "Unknown aggregation: '{}' (use maximum|minimum|average|count|total)",
            aggregation
        );
        std::process::exit(1);
    };

    let config = AppConfig::load().unwrap_or_default();
    let resource_group = config.azure_resource_group()?;
    let client = AzureClient::from_config(&config)?;

    let results = metrics::scale_set_metrics(
        &client,
        &resource_group,
        &scale_sets,
        &metric,
        &namespace,
        aggregation,
    )
    .await?;

    match opts.format {
        OutputFormat::Json => {
            let json = if opts.pretty {
                serde_json::to_string_pretty(&results)?
            } else {
                serde_json::to_string(&results)?
            };
            println!("{}", json);
        }
        OutputFormat::Text => {
            let mut names: Vec<&String> = results.keys().collect();
            names.sort();
            for name in names {
                let line = render_sample(&results[name], aggregation);
                if opts.use_color {
                    use colored::Colorize;
                    let rendered = if line == "no data" {
                        line.yellow().to_string()
                    } else {
                        line
                    };
                    println!("{}  {}", name.bold(), rendered);
                } else {
                    println!("{}  {}", name, line);
                }
            }
        }
    }
    Ok(())
}
