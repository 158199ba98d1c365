//! Boundary checks applied to request payloads before any service logic runs.

use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    models::{
        ChangePasswordRequest, CreateRoleRequest, CreateUserRequest, PermissionInput,
        RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, UpdateRoleRequest,
        UpdateUserRequest,
    },
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// bcrypt only looks at the first 72 bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Trims and lowercases an email and checks it has the `local@domain.tld` shape.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AppError::validation("A valid email is required"))
    }
}

pub fn check_password(field: &str, password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "{field} must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "{field} must be at most {MAX_PASSWORD_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Trims `value` and requires at least `min` characters.
pub fn require_text(field: &str, value: &str, min: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min.max(1) {
        return Err(AppError::validation(if min <= 1 {
            format!("{field} is required")
        } else {
            format!("{field} must be at least {min} characters")
        }));
    }
    Ok(trimmed.to_string())
}

/// Normalises a permission list: trims names, drops duplicate actions within an entry,
/// and rejects empty names or a module listed twice.
pub fn normalize_permissions(entries: &[PermissionInput]) -> AppResult<Vec<PermissionInput>> {
    let mut seen_modules = HashSet::new();
    let mut normalized = Vec::with_capacity(entries.len());

    for entry in entries {
        let module = entry.module.trim().to_string();
        if module.is_empty() {
            return Err(AppError::validation("Permission module is required"));
        }
        if !seen_modules.insert(module.clone()) {
            return Err(AppError::validation(format!(
                "Module '{module}' is listed more than once"
            )));
        }

        let mut actions: Vec<String> = Vec::with_capacity(entry.actions.len());
        for action in &entry.actions {
            let action = action.trim();
            if action.is_empty() {
                return Err(AppError::validation(format!(
                    "Empty action in permissions for '{module}'"
                )));
            }
            if !actions.iter().any(|a| a == action) {
                actions.push(action.to_string());
            }
        }

        normalized.push(PermissionInput { module, actions });
    }

    Ok(normalized)
}

impl RegisterRequest {
    /// Returns a normalised copy or the first validation failure.
    pub fn validated(&self) -> AppResult<Self> {
        check_password("Password", &self.password)?;
        Ok(Self {
            email: normalize_email(&self.email)?,
            password: self.password.clone(),
            first_name: require_text("First name", &self.first_name, 1)?,
            last_name: require_text("Last name", &self.last_name, 1)?,
        })
    }
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.current_password.is_empty() {
            return Err(AppError::validation("Current password is required"));
        }
        check_password("New password", &self.new_password)
    }
}

impl ResetPasswordRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.token.trim().is_empty() {
            return Err(AppError::validation("Reset token is required"));
        }
        check_password("New password", &self.new_password)
    }
}

impl UpdateProfileRequest {
    pub fn validated(&self) -> AppResult<Self> {
        Ok(Self {
            first_name: self
                .first_name
                .as_deref()
                .map(|v| require_text("First name", v, 2))
                .transpose()?,
            last_name: self
                .last_name
                .as_deref()
                .map(|v| require_text("Last name", v, 2))
                .transpose()?,
            email: self.email.as_deref().map(normalize_email).transpose()?,
        })
    }
}

impl CreateRoleRequest {
    pub fn validated(&self) -> AppResult<Self> {
        Ok(Self {
            name: require_text("Name", &self.name, 2)?,
            description: require_text("Description", &self.description, 2)?,
            is_default: self.is_default,
            permissions: self
                .permissions
                .as_deref()
                .map(normalize_permissions)
                .transpose()?,
        })
    }
}

impl UpdateRoleRequest {
    pub fn validated(&self) -> AppResult<Self> {
        Ok(Self {
            name: self
                .name
                .as_deref()
                .map(|v| require_text("Name", v, 2))
                .transpose()?,
            description: self
                .description
                .as_deref()
                .map(|v| require_text("Description", v, 2))
                .transpose()?,
            is_default: self.is_default,
            permissions: normalize_permissions(&self.permissions)?,
        })
    }
}

impl CreateUserRequest {
    pub fn validated(&self) -> AppResult<Self> {
        check_password("Password", &self.password)?;
        Ok(Self {
            email: normalize_email(&self.email)?,
            password: self.password.clone(),
            first_name: require_text("First name", &self.first_name, 1)?,
            last_name: require_text("Last name", &self.last_name, 1)?,
            role_id: self.role_id,
        })
    }
}

impl UpdateUserRequest {
    pub fn validated(&self) -> AppResult<Self> {
        Ok(Self {
            first_name: self
                .first_name
                .as_deref()
                .map(|v| require_text("First name", v, 2))
                .transpose()?,
            last_name: self
                .last_name
                .as_deref()
                .map(|v| require_text("Last name", v, 2))
                .transpose()?,
            email: self.email.as_deref().map(normalize_email).transpose()?,
            is_active: self.is_active,
            role_id: self.role_id,
        })
    }
}
