use anyhow::{anyhow, Context, Result};
use common_auth::{RoleSet, ROLE_ADMIN};
use tracing::{info, warn};

use crate::config::RootUserConfig;
use crate::models::{normalize_email, NewUser, User};
use crate::password::hash_password;
use crate::store::{CredentialStore, StoreError};

/// Ensures the admin role and the root account exist. Existing root
/// accounts are left untouched, including their password.
pub async fn ensure_root_user(store: &dyn CredentialStore, root: &RootUserConfig) -> Result<User> {
    store
        .ensure_role(ROLE_ADMIN)
        .await
        .context("Failed to ensure admin role")?;

    let email = normalize_email(&root.email)
        .ok_or_else(|| anyhow!("ROOT_USER_EMAIL '{}' is not a valid email", root.email))?;

    if let Some(existing) = store
        .find_by_email(&email)
        .await
        .context("Failed to look up root user")?
    {
        info!(user_id = %existing.id, "Root user already present");
        return Ok(existing);
    }

    if root.uses_default_password() {
        warn!(%email, "Creating root user with the default password; set ROOT_USER_PASSWORD");
    }

    let password_hash = hash_password(&root.password).context("Failed to hash root password")?;
    let mut roles = RoleSet::new();
    roles.insert(ROLE_ADMIN);

    let created = match store
        .create(NewUser {
            name: root.name.clone(),
            email: email.clone(),
            password_hash,
            roles,
        })
        .await
    {
        Ok(user) => user,
        // Another replica won the race.
        Err(StoreError::Conflict) => store
            .find_by_email(&email)
            .await
            .context("Failed to reload root user")?
            .ok_or_else(|| anyhow!("Root user vanished after conflict"))?,
        Err(err) => return Err(err).context("Failed to create root user"),
    };

    info!(user_id = %created.id, %email, "Root user created");
    Ok(created)
}
