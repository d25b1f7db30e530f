use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::core::azure::auth::{MANAGEMENT_SCOPE, VAULT_SCOPE};
use crate::core::azure::{AzureClient, MANAGEMENT_BASE};
use crate::core::error::ApiError;
use crate::core::naming;

const MGMT_API_VERSION: &str = "2019-09-01";
const DATA_API_VERSION: &str = "7.1";

#[derive(Deserialize)]
struct VaultListResponse {
    #[serde(default)]
    value: Vec<ResourceEntry>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ResourceEntry {
    id: String,
}

#[derive(Deserialize)]
struct VaultResponse {
    properties: VaultProperties,
}

#[derive(Deserialize)]
struct VaultProperties {
    #[serde(rename = "vaultUri")]
    vault_uri: String,
}

#[derive(Deserialize)]
struct SecretListResponse {
    #[serde(default)]
    value: Vec<ResourceEntry>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// All vault names in the subscription, across every result page.
pub async fn list_vault_names(client: &AzureClient) -> Result<Vec<String>, ApiError> {
    let first_url = format!(
        "{}/subscriptions/{}/providers/Microsoft.KeyVault/vaults",
        MANAGEMENT_BASE,
        client.subscription_id()
    );
    let mut names = Vec::new();
    let mut next: Option<String> = None;

    loop {
        let page: VaultListResponse = match &next {
            // nextLink already carries the api-version query.
            Some(url) => {
                client
                    .get_json(MANAGEMENT_SCOPE, url, &[], "list vaults")
                    .await?
            }
            None => {
                client
                    .get_json(
                        MANAGEMENT_SCOPE,
                        &first_url,
                        &[("api-version", MGMT_API_VERSION)],
                        "list vaults",
                    )
                    .await?
            }
        };
        names.extend(
            page.value
                .iter()
                .map(|entry| naming::last_segment(&entry.id).to_string()),
        );
        match page.next_link {
            Some(link) if !link.is_empty() => next = Some(link),
            _ => break,
        }
    }
    Ok(names)
}

/// The single vault carrying the deployment's naming prefix. Zero matches
/// fail fast; more than one is an explicit ambiguity error rather than an
/// arbitrary pick.
fn select_vault(names: Vec<String>, prefix: &str) -> Result<String, ApiError> {
    let full = naming::full_prefix(prefix);
    let mut matches: Vec<String> = names.into_iter().filter(|n| n.starts_with(&full)).collect();
    match matches.len() {
        0 => Err(ApiError::fatal(format!(
            "no vaults found with prefix {:?}",
            full
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(ApiError::fatal(format!(
            "ambiguous vault prefix {:?}: matches {}",
            full,
            matches.join(", ")
        ))),
    }
}

/// Data-plane URL of a vault, from its management properties.
pub async fn vault_uri(
    client: &AzureClient,
    resource_group: &str,
    vault_name: &str,
) -> Result<String, ApiError> {
    let url = format!(
        "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.KeyVault/vaults/{}",
        MANAGEMENT_BASE,
        client.subscription_id(),
        resource_group,
        vault_name
    );
    let response: VaultResponse = client
        .get_json(
            MANAGEMENT_SCOPE,
            &url,
            &[("api-version", MGMT_API_VERSION)],
            &format!("get vault {}", vault_name),
        )
        .await?;
    Ok(response.properties.vault_uri)
}

async fn list_secret_names(client: &AzureClient, vault_uri: &str) -> Result<Vec<String>, ApiError> {
    let first_url = format!("{}/secrets", vault_uri.trim_end_matches('/'));
    let mut names = Vec::new();
    let mut next: Option<String> = None;

    loop {
        let page: SecretListResponse = match &next {
            Some(url) => {
                client
                    .get_json(VAULT_SCOPE, url, &[], "list secrets")
                    .await?
            }
            None => {
                client
                    .get_json(
                        VAULT_SCOPE,
                        &first_url,
                        &[("api-version", DATA_API_VERSION)],
                        "list secrets",
                    )
                    .await?
            }
        };
        names.extend(
            page.value
                .iter()
                .map(|entry| naming::last_segment(&entry.id).to_string()),
        );
        match page.next_link {
            Some(link) if !link.is_empty() => next = Some(link),
            _ => break,
        }
    }
    Ok(names)
}

async fn get_secret(
    client: &AzureClient,
    vault_uri: &str,
    name: &str,
) -> Result<String, ApiError> {
    let url = format!("{}/secrets/{}", vault_uri.trim_end_matches('/'), name);
    let bundle: SecretBundle = client
        .get_json(
            VAULT_SCOPE,
            &url,
            &[("api-version", DATA_API_VERSION)],
            &format!("get secret {}", name),
        )
        .await?;
    Ok(bundle.value)
}

/// All secrets of the deployment vault as name → plaintext value. There is
/// no batch fetch on the data plane, so each value costs one call.
pub async fn vault_secrets(
    client: &AzureClient,
    resource_group: &str,
    prefix: &str,
) -> Result<HashMap<String, String>, ApiError> {
    let vault_name = select_vault(list_vault_names(client).await?, prefix)?;
    debug!(vault = %vault_name, "selected deployment vault");
    let uri = vault_uri(client, resource_group, &vault_name).await?;

    let names = list_secret_names(client, &uri).await?;
    let mut items = HashMap::with_capacity(names.len());
    for name in names {
        let value = get_secret(client, &uri, &name).await?;
        items.insert(name, value);
    }
    Ok(items)
}
