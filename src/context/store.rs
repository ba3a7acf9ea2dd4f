#![forbid(unsafe_code)]

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::value::Value;

/// Per-query variable store keeping every version written under a name.
///
/// Versions are appended by operators while they run and are only ever
/// dropped from the oldest end (`truncate`) or wholesale (`delete`). All
/// operations take a short reader/writer lock, so concurrent operators never
/// observe a partially written history.
#[derive(Debug, Default)]
pub struct VariableStore {
    vars: RwLock<HashMap<String, Vec<Value>>>,
}

impl VariableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` as the newest version of `name`.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut vars = self.vars.write();
        let history = vars.entry(name).or_default();
        history.push(value);
    }

    /// Returns the latest version of `name`, or [`Value::Empty`] when the
    /// name is unknown or its history was truncated to nothing.
    pub fn get(&self, name: &str) -> Value {
        self.vars
            .read()
            .get(name)
            .and_then(|history| history.last().cloned())
            .unwrap_or_default()
    }

    /// Reads a specific version of `name`.
    ///
    /// `version <= 0` counts back from the latest (`0` is the latest, `-1`
    /// the one before); `version > 0` counts forward from the oldest retained
    /// version (`1` is the oldest). Out of range reads return
    /// [`Value::Empty`].
    pub fn get_version(&self, name: &str, version: i64) -> Value {
        let vars = self.vars.read();
        let Some(history) = vars.get(name) else {
            return Value::Empty;
        };
        let index = if version <= 0 {
            let back = usize::try_from(version.unsigned_abs()).ok();
            history
                .len()
                .checked_sub(1)
                .zip(back)
                .and_then(|(latest, back)| latest.checked_sub(back))
        } else {
            usize::try_from(version - 1).ok()
        };
        index
            .and_then(|i| history.get(i))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every retained version of `name`, oldest first.
    pub fn history(&self, name: &str) -> Vec<Value> {
        self.vars.read().get(name).cloned().unwrap_or_default()
    }

    /// Number of retained versions of `name`.
    pub fn num_versions(&self, name: &str) -> usize {
        self.vars.read().get(name).map_or(0, Vec::len)
    }

    /// Returns `true` when `name` has been set and not deleted.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    /// Drops all but the newest `keep` versions of `name`.
    pub fn truncate(&self, name: &str, keep: usize) {
        let mut vars = self.vars.write();
        let Some(history) = vars.get_mut(name) else {
            return;
        };
        if history.len() <= keep {
            return;
        }
        let dropped = history.len() - keep;
        history.drain(..dropped);
        trace!(var = name, dropped, kept = keep, "store.truncate");
    }

    /// Removes `name` and its whole history. Returns `true` if it existed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.vars.write().remove(name).is_some();
        if removed {
            trace!(var = name, "store.delete");
        }
        removed
    }

    /// Names currently present, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.read().keys().cloned().collect();
        names.sort();
        names
    }
}
