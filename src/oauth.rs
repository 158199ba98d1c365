use reqwest::Url;
use serde::Deserialize;

use crate::{
    config::GoogleOAuthSettings,
    error::{AppError, AppResult},
};

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// The parts of a Google account the login flow needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleProfile {
    pub google_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

/// GoogleOAuthClient
///
/// Authorization-code flow against Google: builds the consent URL and exchanges the
/// callback code for the user's OpenID profile.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    settings: GoogleOAuthSettings,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(settings: GoogleOAuthSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    /// The provider consent screen the browser is redirected to.
    pub fn authorize_url(&self) -> AppResult<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
            ],
        )
        .map_err(|e| AppError::internal(format!("bad google authorize url: {e}")))?;
        Ok(url.into())
    }

    /// Exchanges an authorization `code` and fetches the account profile.
    #[tracing::instrument(name = "google_fetch_profile", skip_all)]
    pub async fn fetch_profile(&self, code: &str) -> AppResult<GoogleProfile> {
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::internal(format!("google token request failed: {e}")))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "google rejected authorization code");
            return Err(AppError::Unauthenticated(
                "Google authentication failed".to_string(),
            ));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::internal(format!("bad google token response: {e}")))?;

        let info = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::internal(format!("google userinfo request failed: {e}")))?
            .json::<UserInfo>()
            .await
            .map_err(|e| AppError::internal(format!("bad google userinfo response: {e}")))?;

        let email = info.email.ok_or_else(|| {
            AppError::Unauthenticated("Google account has no email address".to_string())
        })?;

        Ok(GoogleProfile {
            google_id: info.sub,
            email,
            first_name: info.given_name.unwrap_or_default(),
            last_name: info.family_name.unwrap_or_default(),
        })
    }
}
