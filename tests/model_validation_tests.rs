use chrono::Utc;
use rbac_admin::models::{
    CreateRoleRequest, CreateUserRequest, Permission, RegisterRequest, Role,
    RoleWithPermissions, UpdateRoleRequest, UpdateUserRequest, User, UserProfile, UserWithRole,
};
use serde_json::json;
use uuid::Uuid;

// --- Request payloads ---

#[test]
fn test_register_request_uses_camel_case() {
    let request: RegisterRequest = serde_json::from_value(json!({
        "email": "a@example.com",
        "password": "secret-1",
        "firstName": "Ada",
        "lastName": "Lovelace"
    }))
    .unwrap();
    assert_eq!(request.first_name, "Ada");
    assert_eq!(request.last_name, "Lovelace");

    // snake_case keys are not accepted.
    let rejected = serde_json::from_value::<RegisterRequest>(json!({
        "email": "a@example.com",
        "password": "secret-1",
        "first_name": "Ada",
        "last_name": "Lovelace"
    }));
    assert!(rejected.is_err());
}

#[test]
fn test_create_role_optional_fields_default_to_none() {
    let request: CreateRoleRequest =
        serde_json::from_value(json!({ "name": "Viewer", "description": "Read only" })).unwrap();
    assert_eq!(request.is_default, None);
    assert_eq!(request.permissions, None);
}

#[test]
fn test_update_role_without_permissions_means_empty_set() {
    let request: UpdateRoleRequest =
        serde_json::from_value(json!({ "description": "Renamed" })).unwrap();
    assert_eq!(request.name, None);
    assert_eq!(request.description.as_deref(), Some("Renamed"));
    assert!(request.permissions.is_empty());
}

#[test]
fn test_update_role_permissions_are_parsed_in_order() {
    let request: UpdateRoleRequest = serde_json::from_value(json!({
        "isDefault": true,
        "permissions": [
            { "module": "users", "actions": ["read"] },
            { "module": "roles", "actions": ["create", "read"] }
        ]
    }))
    .unwrap();
    assert_eq!(request.is_default, Some(true));
    assert_eq!(request.permissions[0].module, "users");
    assert_eq!(request.permissions[1].actions, vec!["create", "read"]);
}

#[test]
fn test_user_requests_carry_role_id() {
    let role_id = Uuid::new_v4();
    let create: CreateUserRequest = serde_json::from_value(json!({
        "email": "s@example.com",
        "password": "staff-pass",
        "firstName": "S",
        "lastName": "T",
        "roleId": role_id
    }))
    .unwrap();
    assert_eq!(create.role_id, role_id);

    let update: UpdateUserRequest =
        serde_json::from_value(json!({ "isActive": false })).unwrap();
    assert_eq!(update.is_active, Some(false));
    assert_eq!(update.role_id, None);
    assert_eq!(update.email, None);
}

// --- Responses ---

#[test]
fn test_user_profile_never_exposes_the_password_hash() {
    let now = Utc::now();
    let role = Role {
        id: Uuid::new_v4(),
        name: "Editor".to_string(),
        description: "Editor role".to_string(),
        is_default: false,
        created_at: now,
        updated_at: now,
    };
    let user = User {
        id: Uuid::new_v4(),
        email: "e@example.com".to_string(),
        password_hash: Some("$2b$04$hash".to_string()),
        first_name: "Ed".to_string(),
        last_name: "Itor".to_string(),
        is_active: true,
        role_id: Some(role.id),
        created_at: now,
        updated_at: now,
        ..User::default()
    };

    let profile = UserProfile::from(&UserWithRole {
        user,
        role: Some(role),
    });
    let value = serde_json::to_value(&profile).unwrap();

    assert_eq!(value["firstName"], "Ed");
    assert_eq!(value["isActive"], true);
    assert_eq!(value["role"]["name"], "Editor");
    assert!(value.get("passwordHash").is_none());
    assert!(value.get("password_hash").is_none());
    assert!(!value.to_string().contains("$2b$04$hash"));
}

#[test]
fn test_role_with_permissions_round_trips_through_parts() {
    let now = Utc::now();
    let role = Role {
        id: Uuid::new_v4(),
        name: "Author".to_string(),
        description: "Author role".to_string(),
        is_default: true,
        created_at: now,
        updated_at: now,
    };
    let permission = Permission {
        id: Uuid::new_v4(),
        role_id: role.id,
        module: "dashboard".to_string(),
        actions: vec!["read".to_string()],
    };

    let full = RoleWithPermissions::from_parts(role.clone(), vec![permission.clone()]);
    assert_eq!(full.role(), role);

    let value = serde_json::to_value(&full).unwrap();
    assert_eq!(value["isDefault"], true);
    assert_eq!(value["permissions"][0]["roleId"], json!(role.id));
    assert!(permission.grants("dashboard", "read"));
    assert!(!permission.grants("dashboard", "update"));
}
