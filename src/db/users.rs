use crate::db::models::DbUser;
use crate::db::queue::{Operation, StoreHandle};
use crate::error::LaasError;
use chrono::Utc;
use tracing::debug;

const INSERT_USER: &str = "INSERT INTO users (email, first_name, last_name, password_hash, create_time, privilege) VALUES (?, ?, ?, ?, ?, 0)";
const SELECT_USER: &str = "SELECT email, first_name, last_name, password_hash, create_time, privilege FROM users WHERE email = ?";
const DELETE_USER: &str = "DELETE FROM users WHERE email = ?";
const UPDATE_USER_NAME: &str = "UPDATE users SET first_name = ?, last_name = ? WHERE email = ?";
const UPDATE_USER_PASSWORD: &str = "UPDATE users SET password_hash = ? WHERE email = ?";
const UPDATE_USER_PRIVILEGE: &str = "UPDATE users SET privilege = ? WHERE email = ?";

/// Emails are compared case-insensitively everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Identity repository; every call goes through the store queue.
#[derive(Clone)]
pub struct UserStore {
    store: StoreHandle,
}

impl UserStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Insert a new user. The PRIMARY KEY makes this a single atomic check-and-insert;
    /// an existing email yields [`LaasError::DuplicateKey`] and writes nothing.
    pub async fn create(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> Result<DbUser, LaasError> {
        let email = normalize_email(email);
        let op = Operation::execute(INSERT_USER)
            .bind(email.as_str())
            .bind(first_name)
            .bind(last_name)
            .bind(password_hash)
            .bind(Utc::now());
        match self.store.submit(op).await {
            Ok(_) => {}
            Err(e) if e.is_unique_violation() => {
                debug!(email = %email, "user already exists");
                return Err(LaasError::DuplicateKey(format!("user {email}")));
            }
            Err(e) => return Err(e),
        }
        self.get(&email)
            .await?
            .ok_or_else(|| LaasError::NotFound(format!("user {email}")))
    }

    /// `Ok(None)` when no such user exists.
    pub async fn get(&self, email: &str) -> Result<Option<DbUser>, LaasError> {
        let rows = self
            .store
            .submit(Operation::fetch(SELECT_USER).bind(normalize_email(email)))
            .await?
            .into_rows();
        rows.first().map(DbUser::from_row).transpose()
    }

    /// Returns whether a user was actually removed.
    pub async fn delete(&self, email: &str) -> Result<bool, LaasError> {
        let done = self
            .store
            .submit(Operation::execute(DELETE_USER).bind(normalize_email(email)))
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn update_name(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_USER_NAME)
            .bind(first_name)
            .bind(last_name)
            .bind(normalize_email(email));
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }

    pub async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_USER_PASSWORD)
            .bind(password_hash)
            .bind(normalize_email(email));
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }

    pub async fn update_privilege(&self, email: &str, privilege: i64) -> Result<bool, LaasError> {
        let op = Operation::execute(UPDATE_USER_PRIVILEGE)
            .bind(privilege)
            .bind(normalize_email(email));
        Ok(self.store.submit(op).await?.rows_affected() > 0)
    }
}
