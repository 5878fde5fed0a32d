//! Session-local variable values, kept in step with the template's placeholders.

use serde::{Deserialize, Serialize};

/// Ordered map from placeholder name to its current value.
///
/// Order follows the template's placeholder order after each reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableBindings {
    entries: Vec<(String, String)>,
}

impl VariableBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild bindings for a new variable list.
    ///
    /// Each name keeps its previous value when it had one and starts empty
    /// otherwise; names missing from `names` are dropped.
    pub fn reconcile<S: AsRef<str>>(&self, names: &[S]) -> VariableBindings {
        let mut next = VariableBindings::new();
        for name in names {
            let name = name.as_ref();
            if next.contains(name) {
                continue;
            }
            let value = self.get(name).unwrap_or_default().to_string();
            next.entries.push((name.to_string(), value));
        }
        next
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set the value of an existing binding. Returns `false` if `name` is not bound.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => {
                *v = value.into();
                true
            }
            None => false,
        }
    }

    /// Bound names in order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for VariableBindings {
    /// Later duplicates overwrite earlier values, keeping the first position.
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut bindings = VariableBindings::new();
        for (name, value) in iter {
            if !bindings.set(&name, value.clone()) {
                bindings.entries.push((name, value));
            }
        }
        bindings
    }
}
