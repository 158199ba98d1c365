use crate::models::{
    NewRole, NewUser, Permission, Role, RoleChanges, RoleWithPermissions, User, UserChanges,
    UserWithRole,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Store failures. Uniqueness and foreign-key violations are lifted out of the raw driver
/// error so services can translate them into domain errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A unique constraint rejected the write. Holds the constraint name.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// A foreign key rejected the write. Holds the constraint name.
    #[error("foreign key violated: {0}")]
    ForeignKey(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return RepositoryError::Conflict(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return RepositoryError::ForeignKey(constraint);
            }
        }
        RepositoryError::Database(err)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The credential store contract: users, roles and their permission rows. Handlers and
/// services only ever see `Arc<dyn Repository>`, so Postgres and the in-memory store are
/// interchangeable.
///
/// Role writes (`create_role`, `update_role`, `delete_role`) are atomic: a role is never
/// observable with a partially written permission set.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    // The user plus its role row (if any). Used by the authentication gate.
    async fn get_user_with_role(&self, id: Uuid) -> RepoResult<Option<UserWithRole>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<UserWithRole>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    // Partial update; `None` fields are left unchanged. Returns `None` if the user is absent.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>>;
    // Returns false if the user is absent.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<bool>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;
    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<i64>;

    // --- Roles & Permissions ---
    async fn get_role(&self, id: Uuid) -> RepoResult<Option<RoleWithPermissions>>;
    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>>;
    // Oldest role flagged as default, if any.
    async fn find_default_role(&self) -> RepoResult<Option<Role>>;
    async fn list_roles(&self) -> RepoResult<Vec<RoleWithPermissions>>;
    async fn permissions_for_role(&self, role_id: Uuid) -> RepoResult<Vec<Permission>>;
    // Inserts the role and its permissions; clears `is_default` elsewhere when set.
    async fn create_role(&self, role: NewRole) -> RepoResult<RoleWithPermissions>;
    // Applies scalar changes and replaces the whole permission set.
    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> RepoResult<Option<RoleWithPermissions>>;
    // Removes the permissions, then the role. Returns false if the role is absent.
    async fn delete_role(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
