//! Startup bootstrap: the built-in roles and, when configured, the first administrator.
//! Every step looks its row up by unique name or email first, so reruns change nothing.

use crate::{
    config::SeedAdmin,
    error::AppResult,
    models::{NewRole, NewUser, PermissionInput, Role},
    password,
    permission::{actions, modules},
    repository::RepositoryState,
};

pub const SUPER_ADMIN_ROLE: &str = "Super Admin";

/// Every module with every action it supports.
pub fn all_permissions() -> Vec<PermissionInput> {
    vec![
        PermissionInput::new(modules::DASHBOARD, &[actions::READ]),
        PermissionInput::new(modules::USERS, &actions::CRUD),
        PermissionInput::new(modules::ROLES, &actions::CRUD),
        PermissionInput::new(modules::PERMISSIONS, &actions::CRUD),
    ]
}

/// Summary of what a seed run created.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: usize,
    pub admin_created: bool,
}

/// seed
///
/// Ensures "Super Admin" (all permissions) and the "Admin", "Editor" and "Author" roles
/// exist. "Admin" becomes the default registration role unless some role already holds
/// that flag. With `admin` set, the account is created on "Super Admin".
#[tracing::instrument(skip_all)]
pub async fn seed(
    repo: &RepositoryState,
    admin: Option<&SeedAdmin>,
    bcrypt_cost: u32,
) -> AppResult<SeedReport> {
    let mut report = SeedReport::default();

    let (super_admin, created) = ensure_role(
        repo,
        NewRole {
            name: SUPER_ADMIN_ROLE.to_string(),
            description: "Super admin with all permissions".to_string(),
            is_default: false,
            permissions: all_permissions(),
        },
    )
    .await?;
    report.roles_created += usize::from(created);

    let has_default = repo.find_default_role().await?.is_some();
    for (name, description, is_default) in [
        ("Admin", "Admin role", !has_default),
        ("Editor", "Editor role", false),
        ("Author", "Author role", false),
    ] {
        let (_, created) = ensure_role(
            repo,
            NewRole {
                name: name.to_string(),
                description: description.to_string(),
                is_default,
                permissions: Vec::new(),
            },
        )
        .await?;
        report.roles_created += usize::from(created);
    }

    if let Some(admin) = admin {
        let email = admin.email.trim().to_lowercase();
        if repo.find_user_by_email(&email).await?.is_none() {
            let password_hash = password::hash_password(&admin.password, bcrypt_cost).await?;
            let user = repo
                .create_user(NewUser {
                    email,
                    password_hash: Some(password_hash),
                    first_name: "Super".to_string(),
                    last_name: "Admin".to_string(),
                    google_id: None,
                    role_id: Some(super_admin.id),
                })
                .await?;
            tracing::info!(user_id = %user.id, "seeded administrator account");
            report.admin_created = true;
        }
    }

    tracing::info!(
        roles_created = report.roles_created,
        admin_created = report.admin_created,
        "seed complete"
    );
    Ok(report)
}

async fn ensure_role(repo: &RepositoryState, role: NewRole) -> AppResult<(Role, bool)> {
    if let Some(existing) = repo.find_role_by_name(&role.name).await? {
        return Ok((existing, false));
    }
    let created = repo.create_role(role).await?;
    tracing::info!(role = %created.name, "seeded role");
    Ok((created.role(), true))
}
