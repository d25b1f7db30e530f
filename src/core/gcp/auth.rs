use std::time::Duration;

use crate::core::error::ApiError;
use crate::core::process;

/// GCP access token: `GCP_ACCESS_TOKEN` when set, otherwise whatever
/// identity the local gcloud CLI is logged in with
/// (`GOOGLE_APPLICATION_CREDENTIALS` is honored by gcloud itself).
pub async fn access_token() -> Result<String, ApiError> {
    if let Ok(token) = std::env::var("GCP_ACCESS_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    match process::run_command("gcloud", &["auth", "print-access-token"], Duration::from_secs(30))
        .await
    {
        Ok(token) if !token.is_empty() => Ok(token),
        Ok(_) => Err(ApiError::fatal("gcloud returned an empty access token")),
        Err(err) => Err(ApiError::fatal(format!(
            "cannot obtain GCP access token: {:#}",
            err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_token_wins() {
        std::env::set_var("GCP_ACCESS_TOKEN", "tok-from-env");
        let token = access_token().await.unwrap();
        std::env::remove_var("GCP_ACCESS_TOKEN");
        assert_eq!(token, "tok-from-env");
    }
}
