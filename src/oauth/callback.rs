//! OAuth redirect callback parameters

use serde::Deserialize;
use tracing::debug;

use crate::error::AuthError;

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// State parameter (for CSRF protection)
    pub state: Option<String>,

    /// Error code
    pub error: Option<String>,

    /// Error description
    pub error_description: Option<String>,
}

/// Code and state extracted from a well-formed callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// Authorization code
    pub code: String,
    /// State value to validate against the vault
    pub state: String,
}

impl CallbackParams {
    /// Turn the raw callback into a grant
    ///
    /// A missing `state` is a CSRF failure, never a lenient pass-through.
    ///
    /// # Errors
    ///
    /// - `AuthError::ExchangeFailed` when the provider reported an error or
    ///   the code is missing
    /// - `AuthError::CsrfMismatch` when the state is missing
    pub fn into_grant(self) -> Result<AuthorizationGrant, AuthError> {
        if let Some(error) = self.error {
            let description = self
                .error_description
                .unwrap_or_else(|| "No description provided".to_string());
            debug!(%error, "Provider returned an OAuth error");
            return Err(AuthError::ExchangeFailed(format!(
                "OAuth error: {error} - {description}"
            )));
        }

        let state = self
            .state
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::CsrfMismatch)?;

        let code = self
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::ExchangeFailed("Authorization code not provided".to_string()))?;

        Ok(AuthorizationGrant { code, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_params_deserialize() {
        let params: CallbackParams = serde_urlencoded::from_str("code=abc123&state=xyz789").unwrap();

        assert_eq!(params.code, Some("abc123".to_string()));
        assert_eq!(params.state, Some("xyz789".to_string()));
        assert_eq!(
            params.into_grant().unwrap(),
            AuthorizationGrant {
                code: "abc123".to_string(),
                state: "xyz789".to_string(),
            }
        );
    }

    #[test]
    fn missing_state_is_a_csrf_failure() {
        let params: CallbackParams = serde_urlencoded::from_str("code=abc123").unwrap();
        assert_eq!(params.into_grant().unwrap_err(), AuthError::CsrfMismatch);

        let params: CallbackParams = serde_urlencoded::from_str("code=abc123&state=").unwrap();
        assert_eq!(params.into_grant().unwrap_err(), AuthError::CsrfMismatch);
    }

    #[test]
    fn provider_error_is_reported() {
        let params: CallbackParams =
            serde_urlencoded::from_str("error=access_denied&error_description=User+cancelled")
                .unwrap();
        let err = params.into_grant().unwrap_err();
        assert_eq!(
            err,
            AuthError::ExchangeFailed("OAuth error: access_denied - User cancelled".to_string())
        );
    }

    #[test]
    fn missing_code_is_reported() {
        let params: CallbackParams = serde_urlencoded::from_str("state=xyz").unwrap();
        assert!(matches!(
            params.into_grant().unwrap_err(),
            AuthError::ExchangeFailed(_)
        ));
    }
}
