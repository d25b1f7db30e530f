use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::azure::{auth::MANAGEMENT_SCOPE, AzureClient, MANAGEMENT_BASE};
use crate::core::error::ApiError;
use crate::core::fanout;
use crate::core::models::metric::{latest_sample, Aggregation, MetricSample};
use crate::core::poll::{run_until_settled, IntervalTick, Observation, PollError};

const API_VERSION: &str = "2018-01-01";

/// Query window: trailing five minutes at one-minute granularity.
fn trailing_timespan(now: DateTime<Utc>) -> String {
    let start = now - chrono::Duration::minutes(5);
    format!(
        "{}/{}",
        start.format("%Y-%m-%dT%H:%M:%S"),
        now.format("%Y-%m-%dT%H:%M:%S")
    )
}

#[derive(Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricEntry>,
}

#[derive(Deserialize)]
struct MetricEntry {
    #[serde(default)]
    timeseries: Vec<SeriesEntry>,
}

#[derive(Deserialize)]
struct SeriesEntry {
    #[serde(default)]
    data: Vec<MetricSample>,
}

/// Latest metric sample for one scale set, or `None` when the provider has
/// no data points for the window yet.
pub async fn scale_set_metric(
    client: &AzureClient,
    resource_group: &str,
    scale_set: &str,
    metric: &str,
    namespace: &str,
    aggregation: Aggregation,
) -> Result<Option<MetricSample>, ApiError> {
    let resource_uri = client.scale_set_resource_uri(resource_group, scale_set);
    let url = format!(
        "{}{}/providers/Microsoft.Insights/metrics",
        MANAGEMENT_BASE, resource_uri
    );
    let timespan = trailing_timespan(Utc::now());
    let aggregation_name = aggregation.as_str();
    let query = [
        ("api-version", API_VERSION),
        ("timespan", timespan.as_str()),
        ("interval", "PT1M"),
        ("metricnames", metric),
        ("aggregation", aggregation_name),
        ("orderby", aggregation_name),
        ("$filter", "host eq '*'"),
        ("metricnamespace", namespace),
    ];
    let response: MetricsResponse = client
        .get_json(
            MANAGEMENT_SCOPE,
            &url,
            &query,
            &format!("list metrics for scale set {}", scale_set),
        )
        .await?;

    // The API returns one entry per requested metric name; the last one is
    // the current series.
    let samples: Vec<MetricSample> = response
        .value
        .into_iter()
        .last()
        .map(|entry| entry.timeseries.into_iter().flat_map(|s| s.data).collect())
        .unwrap_or_default();
    Ok(latest_sample(samples, aggregation))
}

/// Batch variant over scale-set names. All-or-nothing: any single failure
/// aborts the batch.
pub async fn scale_set_metrics(
    client: &AzureClient,
    resource_group: &str,
    scale_sets: &[String],
    metric: &str,
    namespace: &str,
    aggregation: Aggregation,
) -> Result<HashMap<String, Option<MetricSample>>, ApiError> {
    let client = client.clone();
    let resource_group = resource_group.to_string();
    let metric = metric.to_string();
    let namespace = namespace.to_string();
    fanout::collect_all(scale_sets.to_vec(), move |scale_set| {
        let client = client.clone();
        let resource_group = resource_group.clone();
        let metric = metric.clone();
        let namespace = namespace.clone();
        async move {
            scale_set_metric(
                &client,
                &resource_group,
                &scale_set,
                &metric,
                &namespace,
                aggregation,
            )
            .await
        }
    })
    .await
}

#[derive(Deserialize)]
struct DefinitionsResponse {
    #[serde(default)]
    value: Vec<Definition>,
}

#[derive(Deserialize)]
struct Definition {
    name: DefinitionName,
}

#[derive(Deserialize)]
struct DefinitionName {
    value: String,
}

fn match_definition(definitions: &DefinitionsResponse, metric: &str) -> Option<String> {
    definitions
        .value
        .iter()
        .find(|d| d.name.value.eq_ignore_ascii_case(metric))
        .map(|d| d.name.value.clone())
}

/// Canonical name of a metric definition within a namespace, matched
/// case-insensitively. `None` until the provider publishes the definition.
pub async fn metric_definition_name(
    client: &AzureClient,
    resource_group: &str,
    scale_set: &str,
    metric: &str,
    namespace: &str,
) -> Result<Option<String>, ApiError> {
    let resource_uri = client.scale_set_resource_uri(resource_group, scale_set);
    let url = format!(
        "{}{}/providers/Microsoft.Insights/metricDefinitions",
        MANAGEMENT_BASE, resource_uri
    );
    let query = [
        ("api-version", API_VERSION),
        ("metricnamespace", namespace),
    ];
    let response: DefinitionsResponse = client
        .get_json(
            MANAGEMENT_SCOPE,
            &url,
            &query,
            &format!("list metric definitions for scale set {}", scale_set),
        )
        .await?;
    Ok(match_definition(&response, metric))
}

/// Poll one scale set's metric definitions until the name is stably
/// published: `attempts` consecutive matches settle, `attempts` errors give
/// up, a 404 just resets the success streak.
#[allow(clippy::too_many_arguments)]
pub async fn wait_metric_definition(
    client: &AzureClient,
    resource_group: &str,
    scale_set: &str,
    metric: &str,
    namespace: &str,
    period: Duration,
    attempts: u32,
    cancel: CancellationToken,
) -> Result<String, ApiError> {
    let mut ticks = IntervalTick::new(period, cancel);
    let probe = || {
        let client = client.clone();
        let resource_group = resource_group.to_string();
        let scale_set = scale_set.to_string();
        let metric = metric.to_string();
        let namespace = namespace.to_string();
        async move {
            match metric_definition_name(&client, &resource_group, &scale_set, &metric, &namespace)
                .await
            {
                Ok(Some(name)) => Observation::Found(name),
                Ok(None) => Observation::Missing,
                Err(err) if err.is_not_found() => Observation::Missing,
                Err(err) => {
                    warn!(
                        %metric,
                        %namespace,
                        %scale_set,
                        error = %err,
                        "error getting metric definitions"
                    );
                    Observation::Faulted(err)
                }
            }
        }
    };

    match run_until_settled(&mut ticks, attempts, probe).await {
        Ok(name) => {
            info!(metric = %name, %namespace, %scale_set, "metric definition resolved");
            Ok(name)
        }
        Err(PollError::Cancelled) => Err(ApiError::fatal(format!(
            "cancelled waiting for metric of namespace {:?}; scale set: {:?}",
            namespace, scale_set
        ))),
        Err(PollError::Exhausted { errors, last }) => Err(ApiError::new(
            last.kind(),
            format!(
                "error getting metric definitions for metric {:?}, namespace {:?}, scale set {:?}; errors occurred {}: {}",
                metric, namespace, scale_set, errors, last
            ),
        )),
    }
}

/// Batch variant: one independent polling loop per scale set at the same
/// period, all sharing the caller's cancellation token. Any terminal
/// failure aborts the batch.
#[allow(clippy::too_many_arguments)]
pub async fn wait_metric_definitions(
    client: &AzureClient,
    resource_group: &str,
    scale_sets: &[String],
    metric: &str,
    namespace: &str,
    period: Duration,
    attempts: u32,
    cancel: &CancellationToken,
) -> Result<HashMap<String, String>, ApiError> {
    let client = client.clone();
    let resource_group = resource_group.to_string();
    let metric = metric.to_string();
    let namespace = namespace.to_string();
    let cancel = cancel.clone();
    fanout::collect_all(scale_sets.to_vec(), move |scale_set| {
        let client = client.clone();
        let resource_group = resource_group.clone();
        let metric = metric.clone();
        let namespace = namespace.clone();
        let cancel = cancel.clone();
        async move {
            wait_metric_definition(
                &client,
                &resource_group,
                &scale_set,
                &metric,
                &namespace,
                period,
                attempts,
                cancel,
            )
            .await
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timespan_covers_trailing_five_minutes() {
        let now = Utc.with_ymd_and_hms(2021, 3, 1, 12, 10, 30).unwrap();
        assert_eq!(
            trailing_timespan(now),
            "2021-03-01T12:05:30/2021-03-01T12:10:30"
        );
    }

    #[test]
    fn deserialize_metrics_response() {
        let json = r#"{
            "cost": 0,
            "value": [{
                "id": "/subscriptions/s/...",
                "name": { "value": "polkadot_validator" },
                "timeseries": [{
                    "data": [
                        { "timeStamp": "2021-03-01T12:04:00Z" },
                        { "timeStamp": "2021-03-01T12:05:00Z", "maximum": 1.0 }
                    ]
                }]
            }]
        }"#;
        let response: MetricsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.value.len(), 1);
        let samples: Vec<MetricSample> = response.value[0]
            .timeseries
            .iter()
            .flat_map(|s| s.data.clone())
            .collect();
        let latest = latest_sample(samples, Aggregation::Maximum).unwrap();
        assert_eq!(latest.maximum, Some(1.0));
    }

    #[test]
    fn deserialize_empty_metrics_response() {
        let response: MetricsResponse = serde_json::from_str(r#"{"value": []}"#).unwrap();
        assert!(response.value.is_empty());
        let response: MetricsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.value.is_empty());
    }

    #[test]
    fn definition_match_is_case_insensitive() {
        let json = r#"{
            "value": [
                { "name": { "value": "Percentage CPU" } },
                { "name": { "value": "polkadot_validator" } }
            ]
        }"#;
        let response: DefinitionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            match_definition(&response, "POLKADOT_VALIDATOR").as_deref(),
            Some("polkadot_validator")
        );
        assert!(match_definition(&response, "memory").is_none());
    }

    #[test]
    fn definition_match_on_empty_list() {
        let response: DefinitionsResponse = serde_json::from_str("{}").unwrap();
        assert!(match_definition(&response, "anything").is_none());
    }
}
