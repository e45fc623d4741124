use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const INSTAGRAM: &str = "com.instagram.android";
pub const YOUTUBE: &str = "com.google.android.youtube";

/// Identifiers blocked when nothing has been saved yet.
pub const DEFAULT_BLOCKED_APPS: [&str; 2] = [INSTAGRAM, YOUTUBE];

/// Set of app identifiers (package / bundle ids) the engine should block.
///
/// Backed by a `BTreeSet` so the list handed to the engine is always sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockedAppSet(BTreeSet<String>);

impl BlockedAppSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        DEFAULT_BLOCKED_APPS.iter().copied().collect()
    }

    pub fn contains(&self, app_identifier: &str) -> bool {
        self.0.contains(app_identifier)
    }

    pub fn insert(&mut self, app_identifier: impl Into<String>) -> bool {
        self.0.insert(app_identifier.into())
    }

    pub fn remove(&mut self, app_identifier: &str) -> bool {
        self.0.remove(app_identifier)
    }

    /// Flip membership; returns whether the app is blocked afterwards.
    pub fn toggle(&mut self, app_identifier: &str) -> bool {
        if self.0.remove(app_identifier) {
            false
        } else {
            self.0.insert(app_identifier.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for BlockedAppSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for BlockedAppSet {
    fn from(apps: Vec<String>) -> Self {
        apps.into_iter().collect()
    }
}
