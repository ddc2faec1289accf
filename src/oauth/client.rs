//! OAuth Exchange Client
//!
//! Authorization-code flow against a single identity provider: builds the
//! authorization URL and turns the returned code into an identity.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::identity::IdentityAssertion;
use super::vault::{StateToken, StateTokenVault};
use crate::config::OAuthConfig;
use crate::error::AuthError;
use crate::{Error, Result};

/// OAuth client for the configured identity provider
pub struct OAuthClient {
    /// HTTP client for token and user-info requests
    http_client: Client,

    /// Outstanding CSRF state tokens
    vault: Arc<StateTokenVault>,

    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_endpoint: Url,
    token_endpoint: String,
    userinfo_endpoint: String,
    scopes: Vec<String>,
    exchange_timeout: Duration,
}

/// OAuth token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Subset of the provider's user-info document we rely on
#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl OAuthClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the authorization endpoint is not a URL.
    pub fn new(http_client: Client, config: &OAuthConfig, vault: Arc<StateTokenVault>) -> Result<Self> {
        let authorization_endpoint = Url::parse(&config.authorization_endpoint)
            .map_err(|e| Error::Config(format!("Invalid auth endpoint: {e}")))?;

        Ok(Self {
            http_client,
            vault,
            client_id: config.resolve_client_id(),
            client_secret: config.resolve_client_secret(),
            redirect_uri: config.redirect_uri.clone(),
            authorization_endpoint,
            token_endpoint: config.token_endpoint.clone(),
            userinfo_endpoint: config.userinfo_endpoint.clone(),
            scopes: config.scopes.clone(),
            exchange_timeout: config.exchange_timeout,
        })
    }

    /// The vault this client issues state tokens from
    #[must_use]
    pub fn vault(&self) -> &Arc<StateTokenVault> {
        &self.vault
    }

    /// Build the provider authorization URL with a freshly issued state
    ///
    /// When `visit` is given the state is bound to it and purged on logout.
    pub fn build_authorization_url(&self, visit: Option<&str>) -> (Url, StateToken) {
        let state = match visit {
            Some(visit) => self.vault.issue_for_visit(visit),
            None => self.vault.issue(),
        };

        let mut auth_url = self.authorization_endpoint.clone();
        {
            let mut params = auth_url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.client_id);
            params.append_pair("redirect_uri", &self.redirect_uri);
            params.append_pair("state", &state.value);
            params.append_pair("access_type", "offline");
            params.append_pair("include_granted_scopes", "true");

            if !self.scopes.is_empty() {
                params.append_pair("scope", &self.scopes.join(" "));
            }
        }

        debug!("Built authorization URL");
        (auth_url, state)
    }

    /// Exchange an authorization code for a verified identity
    ///
    /// The state is checked before any network call. Authorization codes
    /// are single use, so callers must not retry this blindly after a
    /// timeout.
    ///
    /// # Errors
    ///
    /// - `AuthError::CsrfMismatch` / `AuthError::Expired` for a bad state
    /// - `AuthError::ExchangeFailed` for transport, status, schema, or
    ///   timeout failures
    pub async fn exchange(&self, code: &str, state: &str) -> std::result::Result<IdentityAssertion, AuthError> {
        self.vault.validate(state)?;

        if code.trim().is_empty() {
            return Err(AuthError::ExchangeFailed(
                "Authorization code not provided".to_string(),
            ));
        }

        let identity = tokio::time::timeout(self.exchange_timeout, self.exchange_code(code))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.exchange_timeout, "OAuth exchange timed out");
                AuthError::ExchangeFailed("identity provider timed out".to_string())
            })??;

        info!(subject = %identity.subject_email(), "OAuth exchange succeeded");
        Ok(identity)
    }

    /// Token request followed by user-info lookup
    async fn exchange_code(&self, code: &str) -> std::result::Result<IdentityAssertion, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed(format!(
                "Token exchange failed: HTTP {status} - {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::ExchangeFailed(format!("Failed to parse token response: {e}"))
        })?;

        self.fetch_user_info(&token.access_token).await
    }

    async fn fetch_user_info(&self, access_token: &str) -> std::result::Result<IdentityAssertion, AuthError> {
        let response = self
            .http_client
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("User-info request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AuthError::ExchangeFailed(format!(
                "Failed to get user info: HTTP {status}"
            )));
        }

        let info: UserInfo = response.json().await.map_err(|e| {
            AuthError::ExchangeFailed(format!("Failed to parse user info: {e}"))
        })?;

        let email = info
            .email
            .ok_or_else(|| AuthError::ExchangeFailed("User info has no email".to_string()))?;

        IdentityAssertion::new(&email, info.name.as_deref(), info.picture.as_deref())
    }
}
