use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{CreateRoleRequest, NewRole, RoleChanges, RoleWithPermissions, UpdateRoleRequest},
    repository::{RepositoryError, RepositoryState},
};

/// RoleAdmin
///
/// Role and permission administration. Payloads are validated and normalised here,
/// before anything reaches the store; atomicity of each write is the repository's job.
#[derive(Clone)]
pub struct RoleAdmin {
    repo: RepositoryState,
}

impl RoleAdmin {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> AppResult<Vec<RoleWithPermissions>> {
        Ok(self.repo.list_roles().await?)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<RoleWithPermissions> {
        self.repo.get_role(id).await?.ok_or(AppError::NotFound("Role"))
    }

    /// Creates a role with its permission set. Fails `DuplicateName` if the name is taken.
    #[tracing::instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: &CreateRoleRequest) -> AppResult<RoleWithPermissions> {
        let request = request.validated()?;

        if self.repo.find_role_by_name(&request.name).await?.is_some() {
            return Err(AppError::DuplicateName);
        }

        let role = self
            .repo
            .create_role(NewRole {
                name: request.name,
                description: request.description,
                is_default: request.is_default.unwrap_or(false),
                permissions: request.permissions.unwrap_or_default(),
            })
            .await?;

        tracing::info!(role_id = %role.id, "role created");
        Ok(role)
    }

    /// Updates scalar fields and replaces the full permission set.
    #[tracing::instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: &UpdateRoleRequest,
    ) -> AppResult<RoleWithPermissions> {
        let request = request.validated()?;

        if self.repo.get_role(id).await?.is_none() {
            return Err(AppError::NotFound("Role"));
        }
        if let Some(name) = request.name.as_deref() {
            if let Some(holder) = self.repo.find_role_by_name(name).await? {
                if holder.id != id {
                    return Err(AppError::DuplicateName);
                }
            }
        }

        let role = self
            .repo
            .update_role(
                id,
                RoleChanges {
                    name: request.name,
                    description: request.description,
                    is_default: request.is_default,
                    permissions: request.permissions,
                },
            )
            .await?
            .ok_or(AppError::NotFound("Role"))?;

        tracing::info!(role_id = %id, permissions = role.permissions.len(), "role updated");
        Ok(role)
    }

    /// Deletes a role and its permissions. Fails `RoleInUse` while any user holds it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if self.repo.get_role(id).await?.is_none() {
            return Err(AppError::NotFound("Role"));
        }
        if self.repo.count_users_with_role(id).await? > 0 {
            return Err(AppError::RoleInUse);
        }

        // A user assigned between the count and the delete trips the foreign key.
        match self.repo.delete_role(id).await {
            Ok(true) => {
                tracing::info!(role_id = %id, "role deleted");
                Ok(())
            }
            Ok(false) => Err(AppError::NotFound("Role")),
            Err(RepositoryError::ForeignKey(_)) => Err(AppError::RoleInUse),
            Err(e) => Err(e.into()),
        }
    }
}
