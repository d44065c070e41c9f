use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Set of role names carried by a user record or a session token.
///
/// Membership checks are constant time; serialization is sorted so issued
/// tokens and API responses are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    names: HashSet<String>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>) -> bool {
        let role = role.into();
        let trimmed = role.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.names.insert(trimmed.to_string())
    }

    pub fn has_capability(&self, role: &str) -> bool {
        self.names.contains(role)
    }

    /// Any set containing `admin` grants administrative authorization.
    pub fn is_admin(&self) -> bool {
        self.has_capability(ROLE_ADMIN)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut names = self.names.iter().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_sorted_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // `null` shows up for users without roles in some payloads.
        let names = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(names.into_iter().collect())
    }
}
