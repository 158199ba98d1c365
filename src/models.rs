use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Records (Mapped to Database) ---

/// User
///
/// Identity record from the `users` table. Internal only: it carries the password hash
/// and is never serialized to clients. Use [`UserProfile`] for responses.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    // Globally unique, stored normalised (trimmed, lowercase).
    pub email: String,
    // bcrypt hash. `None` for accounts created through OAuth.
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    // External provider subject (Google `sub`).
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    // Owning role. Unset only for records created outside the normal flows.
    pub role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role
///
/// Named authorization group from the `roles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    // Self-registration target. At most one role holds it (enforced on write).
    pub is_default: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Permission
///
/// One grant row: the owning role may perform `actions` on `module`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Permission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub module: String,
    pub actions: Vec<String>,
}

impl Permission {
    /// True when this row grants `action` on `module`.
    pub fn grants(&self, module: &str, action: &str) -> bool {
        self.module == module && self.actions.iter().any(|a| a == action)
    }
}

/// RoleWithPermissions
///
/// A role together with its ordered permission set. This is the shape returned by every
/// role read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoleWithPermissions {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
}

impl RoleWithPermissions {
    pub fn from_parts(role: Role, permissions: Vec<Permission>) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            is_default: role.is_default,
            created_at: role.created_at,
            updated_at: role.updated_at,
            permissions,
        }
    }

    pub fn role(&self) -> Role {
        Role {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            is_default: self.is_default,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A user resolved together with its role, as produced by the authentication gate.
#[derive(Debug, Clone, Default)]
pub struct UserWithRole {
    pub user: User,
    pub role: Option<Role>,
}

// --- Write Models (Repository Inputs) ---

/// Fields for inserting a user. The password is already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub google_id: Option<String>,
    pub role_id: Option<Uuid>,
}

/// Partial user update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<Uuid>,
}

/// Fields for inserting a role and its permission set in one unit.
#[derive(Debug, Clone, Default)]
pub struct NewRole {
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub permissions: Vec<PermissionInput>,
}

/// Role update. Scalar fields are partial; the permission set is always replaced.
#[derive(Debug, Clone, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub permissions: Vec<PermissionInput>,
}

// --- Request Payloads (Input Schemas) ---

/// One permission entry in a role payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PermissionInput {
    #[schema(example = "roles")]
    pub module: String,
    #[schema(example = json!(["create", "read"]))]
    pub actions: Vec<String>,
}

impl PermissionInput {
    pub fn new(module: &str, actions: &[&str]) -> Self {
        Self {
            module: module.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// POST /auth/register
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// POST /auth/login
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/forgot-password
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// POST /auth/reset-password
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// PUT /profile
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// POST /profile/change-password
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /roles
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_default: Option<bool>,
    #[serde(default)]
    pub permissions: Option<Vec<PermissionInput>>,
}

/// PUT /roles/{id}
///
/// The permission list is the complete desired set; omitting it clears the role's grants.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default)]
    pub permissions: Vec<PermissionInput>,
}

/// POST /users
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: Uuid,
}

/// PUT /users/{id}
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
}

// --- Response Schemas (Output) ---

/// UserProfile
///
/// Client-facing view of a user. Never contains the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub role: Option<Role>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user: &User, role: Option<Role>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar.clone(),
            is_active: user.is_active,
            role,
            created_at: user.created_at,
        }
    }
}

impl From<&UserWithRole> for UserProfile {
    fn from(resolved: &UserWithRole) -> Self {
        UserProfile::new(&resolved.user, resolved.role.clone())
    }
}

/// Returned by register, login and OAuth login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

/// Returned by profile and user administration writes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
