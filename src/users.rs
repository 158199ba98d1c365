use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    mailer::{MailEvent, Notifier},
    models::{
        CreateUserRequest, NewUser, UpdateUserRequest, UserChanges, UserProfile, UserWithRole,
    },
    password,
    repository::{RepositoryError, RepositoryState},
};

/// UserAdmin
///
/// Administrative user management behind the `users` permission module.
#[derive(Clone)]
pub struct UserAdmin {
    repo: RepositoryState,
    notifier: Notifier,
    bcrypt_cost: u32,
    admin_notify_email: Option<String>,
}

impl UserAdmin {
    pub fn new(
        repo: RepositoryState,
        notifier: Notifier,
        bcrypt_cost: u32,
        admin_notify_email: Option<String>,
    ) -> Self {
        Self {
            repo,
            notifier,
            bcrypt_cost,
            admin_notify_email,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<UserProfile>> {
        let users = self.repo.list_users().await?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<UserProfile> {
        self.resolve(id).await.map(|u| UserProfile::from(&u))
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn create(&self, request: &CreateUserRequest) -> AppResult<UserProfile> {
        let request = request.validated()?;

        if self.repo.find_user_by_email(&request.email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }
        let role = self
            .repo
            .get_role(request.role_id)
            .await?
            .ok_or(AppError::NotFound("Role"))?
            .role();

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
            .await
            .map_err(role_fk_as_not_found)?;

        tracing::info!(user_id = %user.id, role_id = %role.id, "user created by admin");

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

        Ok(UserProfile::new(&user, Some(role)))
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: &UpdateUserRequest) -> AppResult<UserProfile> {
        let request = request.validated()?;

        if self.repo.get_user(id).await?.is_none() {
            return Err(AppError::NotFound("User"));
        }
        if let Some(email) = request.email.as_deref() {
            if let Some(holder) = self.repo.find_user_by_email(email).await? {
                if holder.id != id {
                    return Err(AppError::DuplicateEmail);
                }
            }
        }
        if let Some(role_id) = request.role_id {
            if self.repo.get_role(role_id).await?.is_none() {
                return Err(AppError::NotFound("Role"));
            }
        }

        self.repo
            .update_user(
                id,
                UserChanges {
                    email: request.email,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    is_active: request.is_active,
                    role_id: request.role_id,
                },
            )
            .await
            .map_err(role_fk_as_not_found)?
            .ok_or(AppError::NotFound("User"))?;

        tracing::info!(user_id = %id, "user updated by admin");
        self.get(id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if self.repo.delete_user(id).await? {
            tracing::info!(user_id = %id, "user deleted");
            Ok(())
        } else {
            Err(AppError::NotFound("User"))
        }
    }

    async fn resolve(&self, id: Uuid) -> AppResult<UserWithRole> {
        self.repo
            .get_user_with_role(id)
            .await?
            .ok_or(AppError::NotFound("User"))
    }
}

/// A role deleted between the existence check and the write surfaces as a foreign key
/// violation.
fn role_fk_as_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::ForeignKey(_) => AppError::NotFound("Role"),
        other => other.into(),
    }
}
