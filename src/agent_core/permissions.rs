//! Permissions — tiered grants for tool execution.
//!
//! Every tool carries one tier:
//! - **r** (read) — inspects state, never changes it.
//! - **w** (write) — modifies files or data.
//! - **x** (execute) — runs arbitrary commands.
//!
//! A call runs without asking only when its tier is in the granted set.
//! The ToolRouter reads a fresh snapshot from the `PermissionStore` for every
//! round, so grants changed by the front end take effect on the next round.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::errors::AgentError;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Permission tier of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "x")]
    Execute,
}

impl Tier {
    /// Single-letter code used in config and logs.
    pub fn code(self) -> char {
        match self {
            Tier::Read => 'r',
            Tier::Write => 'w',
            Tier::Execute => 'x',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            'r' => Some(Tier::Read),
            'w' => Some(Tier::Write),
            'x' => Some(Tier::Execute),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A set of granted tiers. Defaults to read-only.
///
/// Serialized as a compact string such as `"rw"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionSet(BTreeSet<Tier>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a tier string like `"rw"` or `"rwx"`. Whitespace and commas are
    /// ignored; unknown letters are an error.
    pub fn parse(spec: &str) -> Result<Self, AgentError> {
        let mut tiers = BTreeSet::new();
        for ch in spec.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            let tier = Tier::from_code(ch).ok_or_else(|| AgentError::ConfigError {
                reason: format!("unknown permission tier '{ch}' in \"{spec}\""),
            })?;
            tiers.insert(tier);
        }
        Ok(Self(tiers))
    }

    pub fn contains(&self, tier: Tier) -> bool {
        self.0.contains(&tier)
    }

    /// Returns `true` if the tier was newly added.
    pub fn insert(&mut self, tier: Tier) -> bool {
        self.0.insert(tier)
    }

    /// Returns `true` if the tier was present.
    pub fn remove(&mut self, tier: Tier) -> bool {
        self.0.remove(&tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tier> + '_ {
        self.0.iter().copied()
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self(BTreeSet::from([Tier::Read]))
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tier in &self.0 {
            write!(f, "{tier}")?;
        }
        Ok(())
    }
}

impl FromIterator<Tier> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Tier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<String> for PermissionSet {
    type Error = AgentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionSet> for String {
    fn from(value: PermissionSet) -> Self {
        value.to_string()
    }
}

/// Whether a call at `tier` must go through the confirmation policy.
pub fn needs_confirmation(tier: Tier, granted: &PermissionSet) -> bool {
    !granted.contains(tier)
}

// ─── PermissionStore ────────────────────────────────────────────────────────

/// Shared, clonable handle over the granted tier set.
///
/// The front end mutates it (e.g. after a "/allow w" command); the agent
/// loop only takes snapshots.
#[derive(Debug, Clone, Default)]
pub struct PermissionStore {
    granted: Arc<RwLock<PermissionSet>>,
}

impl PermissionStore {
    pub fn new(initial: PermissionSet) -> Self {
        Self {
            granted: Arc::new(RwLock::new(initial)),
        }
    }

    /// Current granted set.
    pub fn snapshot(&self) -> PermissionSet {
        match self.granted.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Grant a tier. Returns `true` if it was not granted before.
    pub fn grant(&self, tier: Tier) -> bool {
        let added = self.with_write(|set| set.insert(tier));
        if added {
            tracing::info!(tier = %tier, "permission granted");
        }
        added
    }

    /// Revoke a tier. Returns `true` if it was granted before.
    pub fn revoke(&self, tier: Tier) -> bool {
        let removed = self.with_write(|set| set.remove(tier));
        if removed {
            tracing::info!(tier = %tier, "permission revoked");
        }
        removed
    }

    /// Replace the whole granted set.
    pub fn replace(&self, set: PermissionSet) {
        tracing::info!(granted = %set, "permissions replaced");
        self.with_write(|current| *current = set);
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut PermissionSet) -> R) -> R {
        match self.granted.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
