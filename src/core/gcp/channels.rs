use anyhow::Context;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::info;

use crate::core::error::{ApiError, MultiError};
use crate::core::gcp::auth;
use crate::core::naming;

const MONITORING_BASE: &str = "https://monitoring.googleapis.com/v3";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelListResponse {
    #[serde(default)]
    notification_channels: Vec<Channel>,
    next_page_token: Option<String>,
}

/// Provider-side filters are advisory; re-check the short names locally.
fn matches_prefix(channel: &Channel, full_prefix: &str) -> bool {
    naming::last_segment(&channel.name).starts_with(full_prefix)
        || naming::last_segment(&channel.display_name).starts_with(full_prefix)
}

/// Client for the Cloud Monitoring notification-channel API. Cheap to
/// clone; every delete task carries its own copy.
#[derive(Clone)]
pub struct MonitoringClient {
    http: reqwest::Client,
    token: String,
    project: String,
}

impl MonitoringClient {
    pub async fn new(project: String) -> Result<Self, ApiError> {
        let token = auth::access_token().await?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::fatal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            token,
            project,
        })
    }

    /// Full resource names of every notification channel whose name or
    /// display name carries the `<prefix>-` convention.
    pub async fn list_channels(&self, prefix: &str) -> Result<Vec<String>, ApiError> {
        let full_prefix = naming::full_prefix(prefix);
        let filter = format!(
            "name = starts_with('{0}') OR display_name = starts_with('{0}')",
            full_prefix
        );
        let url = format!(
            "{}/projects/{}/notificationChannels",
            MONITORING_BASE, self.project
        );

        let mut channels = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = vec![("filter", filter.as_str())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }
            let response = self
                .http
                .get(&url)
                .query(&query)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(ApiError::from)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, "list notification channels", &body));
            }
            let page: ChannelListResponse = response.json().await.map_err(|e| {
                ApiError::fatal(format!("list notification channels: invalid response body: {}", e))
            })?;

            channels.extend(
                page.notification_channels
                    .iter()
                    .filter(|c| matches_prefix(c, &full_prefix))
                    .map(|c| c.name.clone()),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(channels)
    }

    async fn delete_channel(&self, name: &str) -> Result<(), ApiError> {
        let url = format!("{}/{}", MONITORING_BASE, name);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ApiError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, "delete notification channel", &body));
        }
        Ok(())
    }

    /// Delete the given channels, one concurrent task each. A 404 means the
    /// channel is already gone; any other failure is accumulated, and every
    /// deletion runs to completion before errors are reported. With
    /// `dry_run` the channels are only logged.
    pub async fn delete_channels(
        &self,
        channels: Vec<String>,
        dry_run: bool,
    ) -> Result<(), MultiError> {
        let mut tasks = JoinSet::new();
        for channel in channels {
            info!(%channel, dry_run, "deleting notification channel");
            if dry_run {
                continue;
            }
            let client = self.clone();
            tasks.spawn(async move {
                match client.delete_channel(&channel).await {
                    Ok(()) => {
                        info!(%channel, "deleted notification channel");
                        None
                    }
                    Err(err) if err.is_not_found() => {
                        info!(%channel, "notification channel already deleted");
                        None
                    }
                    Err(err) => Some(ApiError::new(
                        err.kind(),
                        format!("could not delete channel {:?}: {}", channel, err),
                    )),
                }
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(err)) => failures.push(err),
                Ok(None) => {}
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => {}
            }
        }
        MultiError::from_vec(failures)
    }
}

/// List-and-delete sweep of the deployment's notification channels.
/// Returns how many channels matched; an empty listing is a no-op.
pub async fn clean(project: &str, prefix: &str, dry_run: bool) -> anyhow::Result<usize> {
    let client = MonitoringClient::new(project.to_string())
        .await
        .context("Cannot create notification channels client")?;
    let channels = client
        .list_channels(prefix)
        .await
        .context("Cannot get notification channels list")?;

    if channels.is_empty() {
        info!("no notification channels to delete");
        return Ok(0);
    }

    let count = channels.len();
    client
        .delete_channels(channels, dry_run)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(count)
}
