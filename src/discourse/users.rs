use std::collections::HashMap;

use tracing::{debug, info};

use super::client::ApiClient;
use super::models::ActiveUser;
use crate::error::{ArchiveError, Result};

/// Maps forum user ids to email addresses.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    emails: HashMap<i64, String>,
}

impl UserDirectory {
    /// Fetch the full active-user list with emails revealed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not a user list.
    pub async fn load(client: &ApiClient) -> Result<Self> {
        let users: Vec<ActiveUser> = client
            .get_json(
                "admin/users/list/active.json",
                &[("show_emails", "true".to_string())],
            )
            .await?;

        let directory = Self::from_users(users);
        info!(users = directory.len(), "Loaded user directory");
        Ok(directory)
    }

    /// Build a directory from already-fetched user entries.
    ///
    /// Users without a visible email are left out.
    #[must_use]
    pub fn from_users(users: impl IntoIterator<Item = ActiveUser>) -> Self {
        let mut emails = HashMap::new();
        for user in users {
            match user.email.filter(|e| !e.is_empty()) {
                Some(email) => {
                    emails.insert(user.id, email);
                }
                None => debug!(user_id = user.id, username = ?user.username, "User has no visible email"),
            }
        }
        Self { emails }
    }

    /// Look up the email address for a user id.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UnknownUser`] if the id is not in the directory.
    pub fn resolve(&self, user_id: i64) -> Result<&str> {
        self.emails
            .get(&user_id)
            .map(String::as_str)
            .ok_or(ArchiveError::UnknownUser(user_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}
