//! Variable interpolation adapter
//!
//! Controller option strings may contain `$(label:name)` placeholders that
//! must be resolved before parsing. The host owns the variable store; this
//! module only defines the seam and a map-backed implementation used by the
//! CLI and tests.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[async_trait]
pub trait VariableResolver: Send + Sync + 'static {
    /// Replace every known placeholder in `template`
    async fn resolve(&self, template: &str) -> String;
}

/// Map-backed resolver
///
/// Unknown placeholders are left untouched.
#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    values: HashMap<String, String>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable; `name` is the text between `$(` and `)`
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Build from `label:name=value` assignments (CLI `--var`)
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (name, value) = assignment
                .split_once('=')
                .filter(|(name, _)| !name.trim().is_empty())
                .ok_or_else(|| {
                    anyhow!("Invalid variable assignment '{assignment}', expected NAME=VALUE")
                })?;
            map.insert(name.trim(), value);
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find(')') else {
                // Unclosed placeholder, keep the remainder verbatim
                out.push_str(&rest[start..]);
                return out;
            };

            let name = &after[..end];
            match self.values.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..start + 2 + end + 1]),
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }
}

#[async_trait]
impl VariableResolver for VariableMap {
    async fn resolve(&self, template: &str) -> String {
        self.interpolate(template)
    }
}
