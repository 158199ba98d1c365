use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{RepoResult, Repository};
use crate::models::{
    NewRole, NewUser, Permission, PermissionInput, Role, RoleChanges, RoleWithPermissions, User,
    UserChanges, UserWithRole,
};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, google_id, avatar, \
                            is_active, role_id, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, description, is_default, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, role_id, module, actions";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn role_with_permissions(&self, role: Role) -> RepoResult<RoleWithPermissions> {
        let permissions = self.permissions_for_role(role.id).await?;
        Ok(RoleWithPermissions::from_parts(role, permissions))
    }
}

/// Inserts `entries` for `role_id` in list order on an open connection (normally a
/// transaction).
async fn insert_permissions(
    conn: &mut PgConnection,
    role_id: Uuid,
    entries: &[PermissionInput],
) -> RepoResult<Vec<Permission>> {
    let mut permissions = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let permission = sqlx::query_as::<_, Permission>(&format!(
            "INSERT INTO permissions (id, role_id, module, actions, position) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(role_id)
        .bind(&entry.module)
        .bind(&entry.actions)
        .bind(position as i32)
        .fetch_one(&mut *conn)
        .await?;
        permissions.push(permission);
    }
    Ok(permissions)
}

/// Clears the default flag on every role except `keep`.
async fn clear_other_defaults(conn: &mut PgConnection, keep: Option<Uuid>) -> RepoResult<()> {
    sqlx::query("UPDATE roles SET is_default = false, updated_at = NOW() WHERE is_default AND ($1::uuid IS NULL OR id <> $1)")
        .bind(keep)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// get_user_with_role
    ///
    /// Fresh lookup on every call so role reassignment and deletion take effect on the
    /// next request.
    async fn get_user_with_role(&self, id: Uuid) -> RepoResult<Option<UserWithRole>> {
        let Some(user) = self.get_user(id).await? else {
            return Ok(None);
        };
        let role = match user.role_id {
            Some(role_id) => {
                sqlx::query_as::<_, Role>(&format!(
                    "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
                ))
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };
        Ok(Some(UserWithRole { user, role }))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> RepoResult<Vec<UserWithRole>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let roles: HashMap<Uuid, Role> =
            sqlx::query_as::<_, Role>(&format!("SELECT {ROLE_COLUMNS} FROM roles"))
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|role| (role.id, role))
                .collect();

        Ok(users
            .into_iter()
            .map(|user| {
                let role = user.role_id.and_then(|id| roles.get(&id).cloned());
                UserWithRole { user, role }
            })
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, google_id, role_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.google_id)
        .bind(user.role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the `Some` fields of `changes` are written.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                is_active = COALESCE($5, is_active),
                role_id = COALESCE($6, role_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.is_active)
        .bind(changes.role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<RoleWithPermissions>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match role {
            Some(role) => Ok(Some(self.role_with_permissions(role).await?)),
            None => Ok(None),
        }
    }

    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    /// find_default_role
    ///
    /// Writes keep at most one default; the ordering is a deterministic tie-break for
    /// databases populated before that rule existed.
    async fn find_default_role(&self) -> RepoResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE is_default ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn list_roles(&self) -> RepoResult<Vec<RoleWithPermissions>> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let permissions = sqlx::query_as::<_, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY position ASC, created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for permission in permissions {
            by_role.entry(permission.role_id).or_default().push(permission);
        }

        Ok(roles
            .into_iter()
            .map(|role| {
                let permissions = by_role.remove(&role.id).unwrap_or_default();
                RoleWithPermissions::from_parts(role, permissions)
            })
            .collect())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> RepoResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE role_id = $1 \
             ORDER BY position ASC, created_at ASC"
        ))
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    /// create_role
    ///
    /// One transaction: default-flag handoff, role row, permission rows.
    #[tracing::instrument(skip(self, role), fields(name = %role.name))]
    async fn create_role(&self, role: NewRole) -> RepoResult<RoleWithPermissions> {
        let mut tx = self.pool.begin().await?;

        if role.is_default {
            clear_other_defaults(&mut *tx, None).await?;
        }

        let created = sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO roles (id, name, description, is_default) VALUES ($1, $2, $3, $4) \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_default)
        .fetch_one(&mut *tx)
        .await?;

        let permissions = insert_permissions(&mut *tx, created.id, &role.permissions).await?;

        tx.commit().await?;
        tracing::info!(role_id = %created.id, count = permissions.len(), "role created");
        Ok(RoleWithPermissions::from_parts(created, permissions))
    }

    /// update_role
    ///
    /// One transaction with delete-then-insert permission replacement. The role row is
    /// locked first so concurrent updates of the same role serialize; the last commit wins.
    #[tracing::instrument(skip(self, changes))]
    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> RepoResult<Option<RoleWithPermissions>> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_none() {
            return Ok(None);
        }

        if changes.is_default == Some(true) {
            clear_other_defaults(&mut *tx, Some(id)).await?;
        }

        let updated = sqlx::query_as::<_, Role>(&format!(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                is_default = COALESCE($4, is_default),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.is_default)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let permissions = insert_permissions(&mut *tx, id, &changes.permissions).await?;

        tx.commit().await?;
        tracing::info!(role_id = %id, count = permissions.len(), "role updated");
        Ok(Some(RoleWithPermissions::from_parts(updated, permissions)))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_role(&self, id: Uuid) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
