//! Credential store: `username password` pairs, one per line, loaded once before the tracker serves.

use std::collections::HashMap;

/// Read-only username → password map.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<String, String>,
}

impl CredentialStore {
    /// Parse the line-oriented credential format. Blank lines are skipped; any other line
    /// must be exactly two space-separated fields.
    pub fn parse(text: &str) -> Result<Self, CredentialError> {
        let mut entries = HashMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(' ');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(user), Some(pass), None) if !user.is_empty() && !pass.is_empty() => {
                    entries.insert(user.to_string(), pass.to_string());
                }
                _ => return Err(CredentialError::Malformed { line: idx + 1 }),
            }
        }
        Ok(Self { entries })
    }

    pub fn from_pairs<I, U, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(u, p)| (u.into(), p.into()))
                .collect(),
        }
    }

    pub fn password_of(&self, username: &str) -> Option<&str> {
        self.entries.get(username).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed credential entry on line {line}")]
    Malformed { line: usize },
}
