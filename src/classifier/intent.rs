//! Routing intents and decisions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Database role a statement can be sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The single writable instance
    Primary,
    /// A read-only, asynchronously replicated copy
    Replica,
}

impl Role {
    /// Returns the role name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing classification of a statement.
///
/// Exactly one intent per statement; classification is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Locking reads, sequence/advisory-lock calls, writing CTEs, and anything
    /// the classifier does not recognize
    ForcePrimary,
    /// Session-scoped settings that must reach every pool
    ForceAll,
    /// Plain write statements
    Write,
    /// Plain reads
    Read,
}

impl Intent {
    /// Returns the intent name
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ForcePrimary => "force_primary",
            Intent::ForceAll => "force_all",
            Intent::Write => "write",
            Intent::Read => "read",
        }
    }

    /// Whether this intent ever reaches a replica
    pub fn uses_replica(&self) -> bool {
        matches!(self, Intent::ForceAll | Intent::Read)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered roles a statement runs against.
///
/// Never empty. Every role runs in order; only the result from the last
/// role is handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    leading: Vec<Role>,
    last: Role,
}

impl RoutingDecision {
    /// A decision with a single role
    pub fn single(role: Role) -> Self {
        Self {
            leading: Vec::new(),
            last: role,
        }
    }

    /// Every pool, replica first so the primary result is the one returned
    pub fn all() -> Self {
        Self {
            leading: vec![Role::Replica],
            last: Role::Primary,
        }
    }

    /// Map a classified intent to its roles
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::ForcePrimary | Intent::Write => Self::single(Role::Primary),
            Intent::ForceAll => Self::all(),
            Intent::Read => Self::single(Role::Replica),
        }
    }

    /// Roles whose results are discarded
    pub fn leading(&self) -> &[Role] {
        &self.leading
    }

    /// Role whose result is returned
    pub fn last(&self) -> Role {
        self.last
    }

    /// All roles in execution order
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = self.leading.clone();
        roles.push(self.last);
        roles
    }

    /// Whether any role is the replica
    pub fn touches_replica(&self) -> bool {
        self.last == Role::Replica || self.leading.contains(&Role::Replica)
    }
}
