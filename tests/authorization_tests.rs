use rbac_admin::{
    AppError, MemoryRepository,
    auth::AuthUser,
    models::{NewRole, NewUser, PermissionInput, RoleChanges, UserWithRole},
    permission::authorize,
    repository::RepositoryState,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn repo() -> RepositoryState {
    Arc::new(MemoryRepository::new())
}

async fn role_with(repo: &RepositoryState, name: &str, permissions: Vec<PermissionInput>) -> Uuid {
    repo.create_role(NewRole {
        name: name.to_string(),
        description: format!("{name} role"),
        is_default: false,
        permissions,
    })
    .await
    .unwrap()
    .id
}

async fn identity(repo: &RepositoryState, role_id: Option<Uuid>) -> AuthUser {
    let user = repo
        .create_user(NewUser {
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: None,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            google_id: None,
            role_id,
        })
        .await
        .unwrap();
    let resolved: UserWithRole = repo.get_user_with_role(user.id).await.unwrap().unwrap();
    AuthUser::new(resolved)
}

// --- Tests ---

#[tokio::test]
async fn test_editor_can_read_but_not_delete_roles() {
    let repo = repo();
    let editor = role_with(&repo, "Editor", vec![PermissionInput::new("roles", &["read"])]).await;
    let user = identity(&repo, Some(editor)).await;

    assert!(authorize(&repo, Some(&user), "roles", "read").await.is_ok());
    assert!(matches!(
        authorize(&repo, Some(&user), "roles", "delete").await,
        Err(AppError::PermissionDenied)
    ));
}

#[tokio::test]
async fn test_grant_is_exactly_module_and_action_membership() {
    let repo = repo();
    let role = role_with(
        &repo,
        "Mixed",
        vec![
            PermissionInput::new("users", &["create", "read"]),
            PermissionInput::new("dashboard", &["read"]),
        ],
    )
    .await;
    let user = identity(&repo, Some(role)).await;

    let cases = [
        ("users", "create", true),
        ("users", "read", true),
        ("users", "delete", false),
        ("dashboard", "read", true),
        ("dashboard", "update", false),
        ("roles", "read", false),
        ("Users", "read", false),
    ];
    for (module, action, allowed) in cases {
        let result = authorize(&repo, Some(&user), module, action).await;
        assert_eq!(result.is_ok(), allowed, "{module}/{action}");
        if !allowed {
            assert!(matches!(result, Err(AppError::PermissionDenied)));
        }
    }
}

#[tokio::test]
async fn test_user_without_role_gets_no_role_assigned() {
    let repo = repo();
    let user = identity(&repo, None).await;

    for (module, action) in [("roles", "read"), ("users", "delete"), ("anything", "any")] {
        assert!(matches!(
            authorize(&repo, Some(&user), module, action).await,
            Err(AppError::NoRoleAssigned)
        ));
    }
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let repo = repo();
    assert!(matches!(
        authorize(&repo, None, "roles", "read").await,
        Err(AppError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_grant_changes_apply_to_the_next_check() {
    let repo = repo();
    let role = role_with(&repo, "Editor", vec![PermissionInput::new("roles", &["read"])]).await;
    let user = identity(&repo, Some(role)).await;
    assert!(authorize(&repo, Some(&user), "roles", "update").await.is_err());

    repo.update_role(
        role,
        RoleChanges {
            permissions: vec![PermissionInput::new("roles", &["read", "update"])],
            ..RoleChanges::default()
        },
    )
    .await
    .unwrap();

    // Same AuthUser value: the check reads permissions fresh, not from the identity.
    assert!(authorize(&repo, Some(&user), "roles", "update").await.is_ok());
}
