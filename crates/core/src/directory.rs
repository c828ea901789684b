//! User lookup capability consumed by the session manager.

use std::sync::OnceLock;

use async_trait::async_trait;
use tracing::warn;

use crate::config::UserConfig;
use crate::error::Result;
use crate::models::user::User;
use crate::passwords::{hash_password, verify_password};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    /// `false` for an unknown user and for a wrong password alike.
    async fn validate_password(&self, username: &str, password: &str) -> Result<bool>;
}

struct Account {
    user: User,
    password_hash: String,
}

/// Local accounts seeded from the `[[users]]` table of `tessera.toml`.
pub struct InMemoryUserDirectory {
    accounts: Vec<Account>,
}

impl InMemoryUserDirectory {
    pub fn from_config(users: &[UserConfig]) -> Self {
        let accounts = users
            .iter()
            .map(|cfg| Account {
                user: User::from(cfg),
                password_hash: cfg.password_hash.clone(),
            })
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn account(&self, username: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|a| a.user.username.eq_ignore_ascii_case(username))
    }
}

/// Hash verified for unknown usernames so both rejection paths cost one argon2 run.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("tessera-dummy-password").ok())
        .as_deref()
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.account(username).map(|a| a.user.clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| a.user.clone()))
    }

    async fn validate_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.account(username) {
            Some(account) => match verify_password(&account.password_hash, password) {
                Ok(valid) => Ok(valid),
                Err(e) => {
                    warn!(username = %account.user.username, error = %e, "stored password hash is unusable");
                    Ok(false)
                }
            },
            None => {
                if let Some(hash) = dummy_hash() {
                    let _ = verify_password(hash, password);
                }
                Ok(false)
            }
        }
    }
}
