pub mod auth;
pub mod metrics;
pub mod vault;

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::error::ApiError;
use auth::{AzureCredentials, TokenProvider};

pub(crate) const MANAGEMENT_BASE: &str = "https://management.azure.com";

/// Authenticated client for the Azure REST surface this tool touches.
/// Cheap to clone; the token cache is shared across clones.
#[derive(Clone)]
pub struct AzureClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    subscription_id: String,
}

impl AzureClient {
    pub fn new(credentials: AzureCredentials, subscription_id: String) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::fatal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            tokens: TokenProvider::new(http.clone(), credentials),
            http,
            subscription_id,
        })
    }

    /// Build a client from resolved configuration: credentials from env or
    /// the auth file, subscription from env/config with the auth file's
    /// subscription as a last resort.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let credentials = auth::read_credentials(config.azure.auth_file.as_deref())?;
        let subscription = match config.azure_subscription() {
            Ok(subscription) => subscription,
            Err(err) => credentials.subscription_id.clone().ok_or(err)?,
        };
        Ok(Self::new(credentials, subscription)?)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Management identifier of a virtual machine scale set.
    pub fn scale_set_resource_uri(&self, resource_group: &str, scale_set: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachineScaleSets/{}",
            self.subscription_id, resource_group, scale_set
        )
    }

    /// GET `url` with a bearer token for `scope` and decode the JSON body.
    /// `what` names the operation in error messages.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        scope: &str,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, ApiError> {
        let token = self.tokens.token(scope).await?;
        let mut request = self.http.get(url).bearer_auth(token).header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await.map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, what, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::fatal(format!("{}: invalid response body: {}", what, e)))
    }
}
