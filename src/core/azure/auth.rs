use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::error::ApiError;

/// OAuth2 scope for the Azure Resource Manager endpoint.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
/// OAuth2 scope for the Key Vault data plane.
pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

// --- Service-principal credentials ---

#[derive(Deserialize)]
struct AuthFile {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
    #[serde(rename = "clientSecret")]
    client_secret: Option<String>,
    #[serde(rename = "tenantId")]
    tenant_id: Option<String>,
    #[serde(rename = "subscriptionId")]
    subscription_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub subscription_id: Option<String>,
}

/// Read service-principal credentials from `AZURE_CLIENT_ID`/
/// `AZURE_CLIENT_SECRET`/`AZURE_TENANT_ID`, falling back to an SDK auth
/// JSON file (`AZURE_AUTH_LOCATION` or the configured path).
pub fn read_credentials(auth_file: Option<&Path>) -> Result<AzureCredentials> {
    if let (Ok(client_id), Ok(client_secret), Ok(tenant_id)) = (
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
        std::env::var("AZURE_TENANT_ID"),
    ) {
        if !client_id.is_empty() && !client_secret.is_empty() && !tenant_id.is_empty() {
            return Ok(AzureCredentials {
                client_id,
                client_secret,
                tenant_id,
                subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
            });
        }
    }

    let path = std::env::var("AZURE_AUTH_LOCATION")
        .map(PathBuf::from)
        .ok()
        .or_else(|| auth_file.map(Path::to_path_buf))
        .context("No Azure credentials: set AZURE_CLIENT_ID/AZURE_CLIENT_SECRET/AZURE_TENANT_ID or AZURE_AUTH_LOCATION")?;

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: AuthFile = serde_json::from_str(&content)
        .with_context(|| "Failed to parse Azure auth JSON")?;

    let client_id = file.client_id.context("Missing 'clientId' in auth file")?;
    let client_secret = file
        .client_secret
        .context("Missing 'clientSecret' in auth file")?;
    let tenant_id = file.tenant_id.context("Missing 'tenantId' in auth file")?;
    if client_id.is_empty() || client_secret.is_empty() || tenant_id.is_empty() {
        anyhow::bail!("Empty credential fields in Azure auth file");
    }

    Ok(AzureCredentials {
        client_id,
        client_secret,
        tenant_id,
        subscription_id: file.subscription_id,
    })
}

// --- Token acquisition ---

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Fetches OAuth2 client-credential tokens per scope and caches them until
/// shortly before expiry.
#[derive(Clone)]
pub struct TokenProvider {
    http: reqwest::Client,
    credentials: AzureCredentials,
    cache: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, credentials: AzureCredentials) -> Self {
        Self {
            http,
            credentials,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn token(&self, scope: &str) -> Result<String, ApiError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope) {
            if cached.expires_at > Utc::now() + ChronoDuration::seconds(60) {
                return Ok(cached.token.clone());
            }
        }

        debug!(scope, "requesting access token");
        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.credentials.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", scope),
        ];
        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, "token request", &body));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::fatal(format!("Failed to parse token response: {}", e)))?;

        let expires_at = match data.expires_in {
            Some(secs) => Utc::now() + ChronoDuration::seconds(secs as i64),
            None => token_expiry(&data.access_token)
                .unwrap_or_else(|| Utc::now() + ChronoDuration::minutes(5)),
        };
        cache.insert(
            scope.to_string(),
            CachedToken {
                token: data.access_token.clone(),
                expires_at,
            },
        );
        Ok(data.access_token)
    }
}

/// Decode a JWT payload without signature verification.
fn decode_jwt_claims(token: &str) -> Result<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        anyhow::bail!("Invalid JWT: expected 3 parts, got {}", parts.len());
    }
    use base64::Engine;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .with_context(|| "Failed to base64url decode JWT payload")?;
    let claims: serde_json::Value =
        serde_json::from_slice(&decoded).with_context(|| "Failed to parse JWT payload as JSON")?;
    Ok(claims)
}

/// Expiry instant from a token's `exp` claim, when present.
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_jwt_claims(token).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
