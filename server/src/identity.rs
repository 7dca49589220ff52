//! Static token table identity.
//!
//! Loads `{token, subject_id, email, user_id, roles}` entries from a JSON
//! file and serves as both [`Authenticator`] and [`UserDirectory`]. Only
//! SHA-256 digests of the tokens are kept in memory.
//!
//! ```json
//! [
//!   {"token": "dev-host", "subject_id": "auth0|host", "email": "host@example.com",
//!    "user_id": 1, "roles": ["host"]},
//!   {"token": "dev-rider", "subject_id": "auth0|rider", "user_id": 2, "roles": ["rider"]}
//! ]
//! ```

use anyhow::{bail, Context};
use rideshare_core::auth::{AuthFuture, Authenticator, Subject, UserDirectory};
use rideshare_core::types::{Role, User, UserId};
use rideshare_core::RideError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

type TokenDigest = [u8; 32];

/// One row of the token table file.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    /// Bearer credential
    pub token: String,
    /// Identity-provider subject
    pub subject_id: String,
    /// Email on record
    #[serde(default)]
    pub email: Option<String>,
    /// Core user id
    pub user_id: UserId,
    /// Capabilities
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

/// Authenticator and user directory backed by a fixed token table.
#[derive(Debug, Default)]
pub struct TokenTable {
    subjects: HashMap<TokenDigest, Subject>,
    users: HashMap<String, User>,
}

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

impl TokenTable {
    /// Empty table: every credential is rejected.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the table from entries.
    ///
    /// # Errors
    ///
    /// Fails on an empty token, a token listed twice or a subject mapped to
    /// two different users.
    pub fn from_entries(entries: impl IntoIterator<Item = TokenEntry>) -> anyhow::Result<Self> {
        let mut table = Self::default();
        for entry in entries {
            if entry.token.trim().is_empty() {
                bail!("empty token for subject {}", entry.subject_id);
            }
            let user = User::new(entry.user_id, entry.roles);
            if let Some(existing) = table.users.get(&entry.subject_id) {
                if *existing != user {
                    bail!("subject {} is mapped to two users", entry.subject_id);
                }
            }
            let subject = Subject {
                subject_id: entry.subject_id.clone(),
                email: entry.email,
            };
            if table.subjects.insert(digest(&entry.token), subject).is_some() {
                bail!("duplicate token for subject {}", entry.subject_id);
            }
            table.users.insert(entry.subject_id, user);
        }
        Ok(table)
    }

    /// Parses a JSON array of [`TokenEntry`].
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON or any [`from_entries`](Self::from_entries) error.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let entries: Vec<TokenEntry> =
            serde_json::from_str(json).context("token table is not a JSON array of entries")?;
        Self::from_entries(entries)
    }

    /// Reads and parses the token table at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token table {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid token table {}", path.display()))
    }

    /// Number of accepted tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Returns true if no token is accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

impl Authenticator for TokenTable {
    fn verify<'a>(&'a self, credential: &'a str) -> AuthFuture<'a, Subject> {
        Box::pin(async move {
            self.subjects
                .get(&digest(credential))
                .cloned()
                .ok_or_else(|| RideError::Unauthenticated("invalid credential".to_string()))
        })
    }
}

impl UserDirectory for TokenTable {
    fn resolve<'a>(&'a self, subject: &'a Subject) -> AuthFuture<'a, User> {
        Box::pin(async move {
            self.users.get(&subject.subject_id).cloned().ok_or_else(|| {
                RideError::Unauthenticated(format!("no user for subject {}", subject.subject_id))
            })
        })
    }
}
