use rbac_admin::{
    AppError, MemoryRepository, RoleAdmin,
    models::{CreateRoleRequest, NewUser, PermissionInput, UpdateRoleRequest, UserChanges},
    repository::RepositoryState,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn setup() -> (RoleAdmin, RepositoryState) {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    (RoleAdmin::new(repo.clone()), repo)
}

fn create_request(name: &str, permissions: Vec<PermissionInput>) -> CreateRoleRequest {
    CreateRoleRequest {
        name: name.to_string(),
        description: format!("{name} role"),
        is_default: None,
        permissions: Some(permissions),
    }
}

async fn assign_user(repo: &RepositoryState, role_id: Uuid) -> Uuid {
    repo.create_user(NewUser {
        email: format!("{}@example.com", Uuid::new_v4()),
        password_hash: None,
        first_name: "Role".to_string(),
        last_name: "Holder".to_string(),
        google_id: None,
        role_id: Some(role_id),
    })
    .await
    .unwrap()
    .id
}

// --- Tests ---

#[tokio::test]
async fn test_create_role_persists_ordered_permissions() {
    let (roles, _) = setup();
    let role = roles
        .create(&create_request(
            "Editor",
            vec![
                PermissionInput::new("roles", &["read"]),
                PermissionInput::new("users", &["read", "update"]),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(role.name, "Editor");
    assert!(!role.is_default);
    let modules: Vec<_> = role.permissions.iter().map(|p| p.module.as_str()).collect();
    assert_eq!(modules, ["roles", "users"]);

    let fetched = roles.get(role.id).await.unwrap();
    assert_eq!(fetched, role);
}

#[tokio::test]
async fn test_create_role_rejects_duplicate_name() {
    let (roles, _) = setup();
    roles.create(&create_request("Editor", vec![])).await.unwrap();

    let err = roles
        .create(&create_request("Editor", vec![PermissionInput::new("roles", &["read"])]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateName));
    assert_eq!(roles.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_role_rejects_duplicate_modules() {
    let (roles, _) = setup();
    let err = roles
        .create(&create_request(
            "Editor",
            vec![
                PermissionInput::new("roles", &["read"]),
                PermissionInput::new("roles", &["delete"]),
            ],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(roles.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_replaces_the_whole_permission_set() {
    let (roles, _) = setup();
    let role = roles
        .create(&create_request(
            "Editor",
            vec![
                PermissionInput::new("roles", &["read"]),
                PermissionInput::new("users", &["read"]),
            ],
        ))
        .await
        .unwrap();

    let updated = roles
        .update(
            role.id,
            &UpdateRoleRequest {
                permissions: vec![PermissionInput::new("dashboard", &["read"])],
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Editor");
    assert_eq!(updated.permissions.len(), 1);
    assert_eq!(updated.permissions[0].module, "dashboard");

    // Omitting the list clears every grant.
    let cleared = roles
        .update(role.id, &UpdateRoleRequest::default())
        .await
        .unwrap();
    assert!(cleared.permissions.is_empty());
}

#[tokio::test]
async fn test_update_rename_conflicts_only_with_other_roles() {
    let (roles, _) = setup();
    let editor = roles.create(&create_request("Editor", vec![])).await.unwrap();
    roles.create(&create_request("Author", vec![])).await.unwrap();

    let err = roles
        .update(
            editor.id,
            &UpdateRoleRequest {
                name: Some("Author".to_string()),
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateName));

    // Keeping its own name is not a conflict.
    let same = roles
        .update(
            editor.id,
            &UpdateRoleRequest {
                name: Some("Editor".to_string()),
                description: Some("Edits content".to_string()),
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same.description, "Edits content");
}

#[tokio::test]
async fn test_update_unknown_role_is_not_found_even_with_a_taken_name() {
    let (roles, _) = setup();
    roles.create(&create_request("Editor", vec![])).await.unwrap();

    let err = roles
        .update(
            Uuid::new_v4(),
            &UpdateRoleRequest {
                name: Some("Editor".to_string()),
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("Role")));
}

#[tokio::test]
async fn test_update_and_delete_unknown_role_are_not_found() {
    let (roles, _) = setup();
    let missing = Uuid::new_v4();

    assert!(matches!(
        roles.update(missing, &UpdateRoleRequest::default()).await,
        Err(AppError::NotFound("Role"))
    ));
    assert!(matches!(roles.delete(missing).await, Err(AppError::NotFound("Role"))));
    assert!(matches!(roles.get(missing).await, Err(AppError::NotFound("Role"))));
}

#[tokio::test]
async fn test_delete_is_blocked_until_users_are_reassigned() {
    let (roles, repo) = setup();
    let editor = roles
        .create(&create_request("Editor", vec![PermissionInput::new("roles", &["read"])]))
        .await
        .unwrap();
    let author = roles.create(&create_request("Author", vec![])).await.unwrap();
    let first = assign_user(&repo, editor.id).await;
    let second = assign_user(&repo, editor.id).await;

    assert!(matches!(roles.delete(editor.id).await, Err(AppError::RoleInUse)));

    for user_id in [first, second] {
        repo.update_user(
            user_id,
            UserChanges {
                role_id: Some(author.id),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();
        if user_id == first {
            // One holder left: still blocked.
            assert!(matches!(roles.delete(editor.id).await, Err(AppError::RoleInUse)));
        }
    }

    roles.delete(editor.id).await.unwrap();
    assert!(matches!(roles.get(editor.id).await, Err(AppError::NotFound("Role"))));
    assert!(repo.permissions_for_role(editor.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_one_role_keeps_the_default_flag() {
    let (roles, repo) = setup();
    let first = roles
        .create(&CreateRoleRequest {
            is_default: Some(true),
            ..create_request("Admin", vec![])
        })
        .await
        .unwrap();
    assert_eq!(repo.find_default_role().await.unwrap().unwrap().id, first.id);

    let second = roles
        .create(&CreateRoleRequest {
            is_default: Some(true),
            ..create_request("Member", vec![])
        })
        .await
        .unwrap();

    let defaults: Vec<_> = roles
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_default)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, second.id);

    roles
        .update(
            first.id,
            &UpdateRoleRequest {
                is_default: Some(true),
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(repo.find_default_role().await.unwrap().unwrap().id, first.id);
    assert!(!roles.get(second.id).await.unwrap().is_default);
}
