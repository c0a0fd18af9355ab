//! Account creation and the startup admin bootstrap.

use trailsync_core::auth::{validate_password, validate_username, Role, User};
use trailsync_core::storage::{RepositoryError, UserRepository};

use crate::error::AuthError;
use crate::password::hash_password;

/// Validates, hashes and stores a new account.
pub async fn create_account(
    users: &dyn UserRepository,
    username: &str,
    password: &str,
    role: Role,
    bcrypt_cost: u32,
) -> Result<User, AuthError> {
    let username = username.trim();
    validate_username(username)?;
    validate_password(password)?;

    if users.get_user_by_username(username).await?.is_some() {
        return Err(RepositoryError::AlreadyExists {
            entity_type: "user",
            id: username.to_string(),
        }
        .into());
    }

    let hash = hash_password(password, bcrypt_cost).await?;
    let user = User::new(username, hash).with_role(role);
    users.create_user(&user).await?;

    tracing::info!(username = %user.username, role = %user.role, "created user account");
    Ok(user)
}

/// Creates the configured admin account when it does not exist yet.
///
/// Returns the new user, or `None` when the account was already there.
pub async fn ensure_admin_user(
    users: &dyn UserRepository,
    username: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<Option<User>, AuthError> {
    if users.get_user_by_username(username.trim()).await?.is_some() {
        tracing::debug!(username, "admin user already exists");
        return Ok(None);
    }

    create_account(users, username, password, Role::Admin, bcrypt_cost)
        .await
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryUsers;

    #[tokio::test]
    async fn creates_admin_once() {
        let users = MemoryUsers::default();

        let created = ensure_admin_user(&users, "admin", "supersecret", 4)
            .await
            .unwrap();
        assert!(created.unwrap().is_admin());

        let again = ensure_admin_user(&users, "admin", "different-pw", 4)
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(users.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let users = MemoryUsers::default();
        create_account(&users, "alice", "password1", Role::User, 4)
            .await
            .unwrap();

        let err = create_account(&users, "alice", "password2", Role::User, 4)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn weak_password_is_rejected() {
        let users = MemoryUsers::default();
        let err = create_account(&users, "alice", "short", Role::User, 4)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
