use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    mailer::{MailEvent, Notifier},
    models::{
        AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
        MessageResponse, NewUser, RegisterRequest, ResetPasswordRequest, Role,
        UpdateProfileRequest, User, UserChanges, UserProfile, UserResponse,
    },
    oauth::GoogleProfile,
    password,
    repository::RepositoryState,
    token::Tokens,
    validation::normalize_email,
};

pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent";

/// Accounts
///
/// The credential lifecycle: registration, password and OAuth login, profile edits,
/// password change and the reset-by-email flow.
#[derive(Clone)]
pub struct Accounts {
    repo: RepositoryState,
    tokens: Tokens,
    notifier: Notifier,
    bcrypt_cost: u32,
    frontend_url: String,
    reset_expiry_hours: i64,
    admin_notify_email: Option<String>,
    // Hash verified when a login has no real hash to check, so every attempt costs the same.
    decoy_hash: Arc<OnceCell<String>>,
}

impl Accounts {
    pub fn new(
        repo: RepositoryState,
        tokens: Tokens,
        notifier: Notifier,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            tokens,
            notifier,
            bcrypt_cost: config.bcrypt_cost,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            reset_expiry_hours: config.reset_expiry_hours(),
            admin_notify_email: config.admin_notify_email.clone(),
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// register
    ///
    /// Creates an active account bound to the default role and signs the caller in.
    /// Fails `DuplicateEmail` when the email is taken and `NoDefaultRole` when no role
    /// carries the default flag. Welcome and admin mails are best-effort.
    #[tracing::instrument(skip(self, request))]
    pub async fn register(&self, request: &RegisterRequest) -> AppResult<AuthResponse> {
        let request = request.validated()?;

        if self.repo.find_user_by_email(&request.email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }
        let role = self.default_role().await?;

        let password_hash = password::hash_password(&request.password, self.bcrypt_cost).await?;
        let user = self
            .repo
            .create_user(NewUser {
                email: request.email,
                password_hash: Some(password_hash),
                first_name: request.first_name,
                last_name: request.last_name,
                google_id: None,
                role_id: Some(role.id),
            })
            .await?;

        tracing::info!(user_id = %user.id, role_id = %role.id, "user registered");
        self.announce_new_user(&user).await;

        self.session("User registered successfully", &user, Some(role))
    }

    /// login
    ///
    /// Unknown email, wrong password, a password-less (OAuth) account and a deactivated
    /// account all fail with the same `InvalidCredentials`.
    #[tracing::instrument(skip(self, request))]
    pub async fn login(&self, request: &LoginRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&request.email).map_err(|_| AppError::InvalidCredentials)?;

        let Some(user) = self.repo.find_user_by_email(&email).await? else {
            self.check_login_password(&request.password, None).await?;
            return Err(AppError::InvalidCredentials);
        };
        if !self
            .check_login_password(&request.password, user.password_hash.as_deref())
            .await?
        {
            return Err(AppError::InvalidCredentials);
        }
        if !user.is_active {
            tracing::debug!(user_id = %user.id, "login refused for deactivated account");
            return Err(AppError::InvalidCredentials);
        }

        let role = self.role_of(&user).await?;
        tracing::info!(user_id = %user.id, "login succeeded");
        self.session("Login successful", &user, role)
    }

    /// oauth_login
    ///
    /// Resolves the account by provider id, creating one bound to the default role on
    /// first login. No password is ever involved.
    #[tracing::instrument(skip(self, profile), fields(google_id = %profile.google_id))]
    pub async fn oauth_login(&self, profile: GoogleProfile) -> AppResult<AuthResponse> {
        let user = match self.repo.find_user_by_google_id(&profile.google_id).await? {
            Some(user) => user,
            None => {
                let role = self.default_role().await?;
                let email = normalize_email(&profile.email)?;
                if self.repo.find_user_by_email(&email).await?.is_some() {
                    return Err(AppError::DuplicateEmail);
                }
                let user = self
                    .repo
                    .create_user(NewUser {
                        email,
                        password_hash: None,
                        first_name: profile.first_name,
                        last_name: profile.last_name,
                        google_id: Some(profile.google_id),
                        role_id: Some(role.id),
                    })
                    .await?;
                tracing::info!(user_id = %user.id, "user created from google login");
                self.announce_new_user(&user).await;
                user
            }
        };

        if !user.is_active {
            return Err(AppError::InvalidCredentials);
        }

        let role = self.role_of(&user).await?;
        self.session("Google login successful", &user, role)
    }

    /// The caller's profile, re-read from the store.
    pub async fn profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let resolved = self
            .repo
            .get_user_with_role(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;
        Ok(UserProfile::from(&resolved))
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: &UpdateProfileRequest,
    ) -> AppResult<UserResponse> {
        let request = request.validated()?;

        if let Some(email) = request.email.as_deref() {
            if let Some(holder) = self.repo.find_user_by_email(email).await? {
                if holder.id != user_id {
                    return Err(AppError::DuplicateEmail);
                }
            }
        }

        self.repo
            .update_user(
                user_id,
                UserChanges {
                    email: request.email,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    ..UserChanges::default()
                },
            )
            .await?
            .ok_or(AppError::NotFound("User"))?;

        Ok(UserResponse {
            message: "Profile updated successfully".to_string(),
            user: self.profile(user_id).await?,
        })
    }

    /// change_password
    ///
    /// Fails `NotFound` if the account vanished after the token was issued and
    /// `IncorrectPassword` if `current_password` does not match.
    #[tracing::instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: &ChangePasswordRequest,
    ) -> AppResult<MessageResponse> {
        request.validate()?;

        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        if !password::verify_password(&request.current_password, user.password_hash.as_deref())
            .await?
        {
            return Err(AppError::IncorrectPassword);
        }

        let hash = password::hash_password(&request.new_password, self.bcrypt_cost).await?;
        if !self.repo.set_password_hash(user_id, &hash).await? {
            return Err(AppError::NotFound("User"));
        }

        tracing::info!(user_id = %user_id, "password changed");
        self.notify_password_changed(&user).await;
        Ok(MessageResponse::new("Password changed successfully"))
    }

    /// request_password_reset
    ///
    /// Always answers with the same message. When the email belongs to an account, a
    /// reset token is issued and mailed; a failed send is logged, not reported.
    #[tracing::instrument(skip(self, request))]
    pub async fn request_password_reset(
        &self,
        request: &ForgotPasswordRequest,
    ) -> AppResult<MessageResponse> {
        let email = normalize_email(&request.email)?;

        match self.repo.find_user_by_email(&email).await? {
            Some(user) => {
                let token = self.tokens.reset.issue(user.id)?;
                let reset_link = match reset_link(&self.frontend_url, &token) {
                    Ok(link) => link,
                    Err(e) => {
                        tracing::error!(error = %e, "cannot build password reset link");
                        return Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE));
                    }
                };
                self.notifier
                    .notify(
                        MailEvent::PasswordResetLink,
                        &user.email,
                        HashMap::from([
                            ("firstName", user.first_name.clone()),
                            ("resetLink", reset_link),
                            ("resetExpiry", self.reset_expiry_hours.to_string()),
                        ]),
                    )
                    .await;
                tracing::info!(user_id = %user.id, "password reset requested");
            }
            None => tracing::debug!("password reset requested for unknown email"),
        }

        Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
    }

    /// reset_password
    ///
    /// Accepts only reset-purpose tokens. Any verification failure, or an account that
    /// no longer exists, is `InvalidOrExpiredToken`.
    #[tracing::instrument(skip(self, request))]
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> AppResult<MessageResponse> {
        request.validate()?;

        let user_id = self.tokens.reset.verify(request.token.trim()).map_err(|e| {
            tracing::debug!(error = %e, "reset token rejected");
            AppError::InvalidOrExpiredToken
        })?;
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        let hash = password::hash_password(&request.new_password, self.bcrypt_cost).await?;
        if !self.repo.set_password_hash(user_id, &hash).await? {
            return Err(AppError::InvalidOrExpiredToken);
        }

        tracing::info!(user_id = %user_id, "password reset completed");
        self.notify_password_changed(&user).await;
        Ok(MessageResponse::new("Password has been reset successfully"))
    }

    async fn default_role(&self) -> AppResult<Role> {
        self.repo
            .find_default_role()
            .await?
            .ok_or(AppError::NoDefaultRole)
    }

    /// Verifies against `hash`, or against the decoy when there is none. Either way one
    /// bcrypt verification runs, so response time does not reveal whether the account exists.
    async fn check_login_password(&self, candidate: &str, hash: Option<&str>) -> AppResult<bool> {
        match hash {
            Some(hash) => password::verify_password(candidate, Some(hash)).await,
            None => {
                let decoy = self
                    .decoy_hash
                    .get_or_try_init(|| password::hash_password("decoy-password", self.bcrypt_cost))
                    .await?;
                password::verify_password(candidate, Some(decoy.as_str())).await?;
                Ok(false)
            }
        }
    }

    async fn role_of(&self, user: &User) -> AppResult<Option<Role>> {
        match user.role_id {
            Some(role_id) => Ok(self.repo.get_role(role_id).await?.map(|r| r.role())),
            None => Ok(None),
        }
    }

    fn session(&self, message: &str, user: &User, role: Option<Role>) -> AppResult<AuthResponse> {
        Ok(AuthResponse {
            message: message.to_string(),
            token: self.tokens.session.issue(user.id)?,
            user: UserProfile::new(user, role),
        })
    }

    async fn announce_new_user(&self, user: &User) {
        self.notifier
            .notify(
                MailEvent::Registration,
                &user.email,
                HashMap::from([("firstName", user.first_name.clone())]),
            )
            .await;

        if let Some(admin) = self.admin_notify_email.as_deref() {
            self.notifier
                .notify(
                    MailEvent::AdminNewUser,
                    admin,
                    HashMap::from([
                        ("firstName", user.first_name.clone()),
                        ("lastName", user.last_name.clone()),
                        ("email", user.email.clone()),
                        ("registrationDate", Utc::now().to_rfc2822()),
                    ]),
                )
                .await;
        }
    }

    async fn notify_password_changed(&self, user: &User) {
        self.notifier
            .notify(
                MailEvent::PasswordChanged,
                &user.email,
                HashMap::from([("firstName", user.first_name.clone())]),
            )
            .await;
    }
}

/// `{frontend_url}/reset-password?token=...` with the token query-encoded.
fn reset_link(frontend_url: &str, token: &str) -> AppResult<String> {
    let mut url = reqwest::Url::parse(&format!("{frontend_url}/reset-password"))
        .map_err(|e| AppError::internal(format!("invalid FRONTEND_URL: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mailer::MockMailer, repository::MemoryRepository};

    fn accounts() -> Accounts {
        let config = AppConfig::default();
        Accounts::new(
            Arc::new(MemoryRepository::new()),
            Tokens::from_config(&config),
            Notifier::new(Arc::new(MockMailer::new()), &config),
            &config,
        )
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_bcrypt_check() {
        let accounts = accounts();
        assert!(accounts.decoy_hash.get().is_none());

        let err = accounts
            .login(&LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "secret-1".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidCredentials));
        assert!(accounts.decoy_hash.get().is_some());
    }

    #[test]
    fn reset_link_query_encodes_the_token() {
        let link = reset_link("http://localhost:3000", "a.b c&d").unwrap();
        assert_eq!(link, "http://localhost:3000/reset-password?token=a.b+c%26d");

        let jwt_like = reset_link("https://admin.example.com/app", "eyJ.eyJ.sig-_").unwrap();
        assert_eq!(
            jwt_like,
            "https://admin.example.com/app/reset-password?token=eyJ.eyJ.sig-_"
        );
    }
}
