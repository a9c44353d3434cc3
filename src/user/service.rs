use std::sync::Arc;

use validator::Validate;

use crate::crypto::PasswordHasher;
use crate::error::{Result, ServerError};
use crate::rpc::schema::{
    CreateUserRequest, CreateUserResponse, DeleteUserRequest,
    DeleteUserResponse, GetUserByIdRequest, GetUserByIdResponse,
    UpdateUserRequest, UpdateUserResponse,
};
use crate::user::{NewUser, UserRepository};

/// User manager.
///
/// Stateless between calls: everything it holds is shared and read-only.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self { repo, hasher }
    }

    /// Look a user up. An unknown id is an absent user, not an error.
    pub async fn get_user_by_id(
        &self,
        request: GetUserByIdRequest,
    ) -> Result<GetUserByIdResponse> {
        let user = self.repo.find(&request.id).await?;
        if user.is_none() {
            tracing::debug!(user_id = %request.id, "user not found");
        }

        Ok(GetUserByIdResponse {
            user: user.map(Into::into),
        })
    }

    /// Hash password then insert user.
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<CreateUserResponse> {
        request.validate()?;
        let CreateUserRequest {
            username,
            email,
            password,
        } = request;

        // Argon2 is CPU-bound: keep it off the async workers.
        let hasher = Arc::clone(&self.hasher);
        let password_hash =
            tokio::task::spawn_blocking(move || hasher.hash(&password))
                .await
                .map_err(|err| ServerError::internal("hashing task failed", err))??;

        let user = self
            .repo
            .insert(NewUser {
                username,
                email,
                password_hash,
            })
            .await?;
        tracing::info!(user_id = %user.id, "user created");

        Ok(CreateUserResponse { user: user.into() })
    }

    /// Merge present fields into the stored user.
    pub async fn update_user(
        &self,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse> {
        request.validate()?;

        let Some(mut user) = self.repo.find(&request.id).await? else {
            tracing::debug!(user_id = %request.id, "user not found for update");
            return Ok(UpdateUserResponse::default());
        };

        if let Some(username) = request.username {
            user.username = username;
        }
        if let Some(email) = request.email {
            user.email = email;
        }

        let user = self.repo.save(&user).await?;
        match &user {
            Some(user) => tracing::info!(user_id = %user.id, "user updated"),
            None => tracing::debug!(user_id = %request.id, "user removed during update"),
        }

        Ok(UpdateUserResponse {
            user: user.map(Into::into),
        })
    }

    /// Physically delete a user.
    pub async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse> {
        let removed = self.repo.remove(&request.id).await?;

        if removed > 0 {
            tracing::info!(user_id = %request.id, "user deleted");
            Ok(DeleteUserResponse {
                success: true,
                message: format!("User {} deleted successfully.", request.id),
            })
        } else {
            Ok(DeleteUserResponse {
                success: false,
                message: format!("User {} not found.", request.id),
            })
        }
    }
}
