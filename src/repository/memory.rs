use async_trait::async_trait;
use chrono::Utc;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::models::{
    NewRole, NewUser, Permission, PermissionInput, Role, RoleChanges, RoleWithPermissions, User,
    UserChanges, UserWithRole,
};

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    roles: Vec<Role>,
    // Kept in insertion order, which is the permission list order per role.
    permissions: Vec<Permission>,
}

impl MemoryState {
    fn role(&self, id: Uuid) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    fn permissions_for(&self, role_id: Uuid) -> Vec<Permission> {
        self.permissions
            .iter()
            .filter(|p| p.role_id == role_id)
            .cloned()
            .collect()
    }

    fn with_permissions(&self, role: &Role) -> RoleWithPermissions {
        RoleWithPermissions::from_parts(role.clone(), self.permissions_for(role.id))
    }

    fn replace_permissions(&mut self, role_id: Uuid, entries: &[PermissionInput]) {
        self.permissions.retain(|p| p.role_id != role_id);
        self.permissions
            .extend(entries.iter().map(|entry| Permission {
                id: Uuid::new_v4(),
                role_id,
                module: entry.module.clone(),
                actions: entry.actions.clone(),
            }));
    }

    fn clear_defaults_except(&mut self, keep: Option<Uuid>) {
        for role in self.roles.iter_mut() {
            if role.is_default && Some(role.id) != keep {
                role.is_default = false;
                role.updated_at = Utc::now();
            }
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .iter()
            .any(|r| r.name == name && Some(r.id) != except)
    }
}

/// MemoryRepository
///
/// A process-local `Repository` for tests and local experiments. Every write runs
/// under one lock, so role writes are atomic, and the Postgres unique and foreign-key
/// constraints are mirrored with the same constraint names.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_with_role(&self, id: Uuid) -> RepoResult<Option<UserWithRole>> {
        let state = self.read();
        Ok(state.users.iter().find(|u| u.id == id).map(|user| UserWithRole {
            user: user.clone(),
            role: user.role_id.and_then(|rid| state.role(rid).cloned()),
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.read().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>> {
        Ok(self
            .read()
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<UserWithRole>> {
        let state = self.read();
        Ok(state
            .users
            .iter()
            .map(|user| UserWithRole {
                user: user.clone(),
                role: user.role_id.and_then(|rid| state.role(rid).cloned()),
            })
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut state = self.write();
        if state.email_taken(&user.email, None) {
            return Err(RepositoryError::Conflict("users_email_key".to_string()));
        }
        if let Some(google_id) = user.google_id.as_deref() {
            if state
                .users
                .iter()
                .any(|u| u.google_id.as_deref() == Some(google_id))
            {
                return Err(RepositoryError::Conflict("users_google_id_key".to_string()));
            }
        }
        if let Some(role_id) = user.role_id {
            if state.role(role_id).is_none() {
                return Err(RepositoryError::ForeignKey("users_role_id_fkey".to_string()));
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            google_id: user.google_id,
            avatar: None,
            is_active: true,
            role_id: user.role_id,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut state = self.write();
        if let Some(email) = changes.email.as_deref() {
            if state.email_taken(email, Some(id)) {
                return Err(RepositoryError::Conflict("users_email_key".to_string()));
            }
        }
        if let Some(role_id) = changes.role_id {
            if state.role(role_id).is_none() {
                return Err(RepositoryError::ForeignKey("users_role_id_fkey".to_string()));
            }
        }

        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(role_id) = changes.role_id {
            user.role_id = Some(role_id);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let mut state = self.write();
        match state.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.password_hash = Some(password_hash.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut state = self.write();
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        Ok(state.users.len() < before)
    }

    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<i64> {
        let count = self
            .read()
            .users
            .iter()
            .filter(|u| u.role_id == Some(role_id))
            .count();
        Ok(count as i64)
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<RoleWithPermissions>> {
        let state = self.read();
        Ok(state.role(id).map(|role| state.with_permissions(role)))
    }

    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        Ok(self.read().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn find_default_role(&self) -> RepoResult<Option<Role>> {
        Ok(self
            .read()
            .roles
            .iter()
            .filter(|r| r.is_default)
            .min_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn list_roles(&self) -> RepoResult<Vec<RoleWithPermissions>> {
        let state = self.read();
        Ok(state
            .roles
            .iter()
            .map(|role| state.with_permissions(role))
            .collect())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> RepoResult<Vec<Permission>> {
        Ok(self.read().permissions_for(role_id))
    }

    async fn create_role(&self, role: NewRole) -> RepoResult<RoleWithPermissions> {
        let mut state = self.write();
        if state.name_taken(&role.name, None) {
            return Err(RepositoryError::Conflict("roles_name_key".to_string()));
        }
        if role.is_default {
            state.clear_defaults_except(None);
        }

        let now = Utc::now();
        let created = Role {
            id: Uuid::new_v4(),
            name: role.name,
            description: role.description,
            is_default: role.is_default,
            created_at: now,
            updated_at: now,
        };
        state.roles.push(created.clone());
        state.replace_permissions(created.id, &role.permissions);
        Ok(state.with_permissions(&created))
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> RepoResult<Option<RoleWithPermissions>> {
        let mut state = self.write();
        if state.role(id).is_none() {
            return Ok(None);
        }
        if let Some(name) = changes.name.as_deref() {
            if state.name_taken(name, Some(id)) {
                return Err(RepositoryError::Conflict("roles_name_key".to_string()));
            }
        }
        if changes.is_default == Some(true) {
            state.clear_defaults_except(Some(id));
        }

        let updated = {
            let Some(role) = state.roles.iter_mut().find(|r| r.id == id) else {
                return Ok(None);
            };
            if let Some(name) = changes.name {
                role.name = name;
            }
            if let Some(description) = changes.description {
                role.description = description;
            }
            if let Some(is_default) = changes.is_default {
                role.is_default = is_default;
            }
            role.updated_at = Utc::now();
            role.clone()
        };
        state.replace_permissions(id, &changes.permissions);
        Ok(Some(state.with_permissions(&updated)))
    }

    async fn delete_role(&self, id: Uuid) -> RepoResult<bool> {
        let mut state = self.write();
        if state.role(id).is_none() {
            return Ok(false);
        }
        if state.users.iter().any(|u| u.role_id == Some(id)) {
            return Err(RepositoryError::ForeignKey("users_role_id_fkey".to_string()));
        }
        state.permissions.retain(|p| p.role_id != id);
        state.roles.retain(|r| r.id != id);
        Ok(true)
    }
}
