use crate::error::{Result, StackError};
use std::fmt;

/// A package to install: a plain name or a name pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
}

impl Dependency {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
        }
    }

    pub fn pinned(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Some(version.to_string()),
        }
    }

    /// Parses a configuration entry: `"name"`, `["name"]` or `["name", "version"]`.
    pub fn from_value(value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::String(name) => Ok(Self::new(name)),
            toml::Value::Array(items) => match items.as_slice() {
                [toml::Value::String(name)] => Ok(Self::new(name)),
                [toml::Value::String(name), toml::Value::String(version)] => {
                    Ok(Self::pinned(name, version))
                }
                _ => Err(StackError::InvalidDependency(value.to_string())),
            },
            other => Err(StackError::InvalidDependency(other.to_string())),
        }
    }

    pub fn from_values(values: &[toml::Value]) -> Result<Vec<Self>> {
        values.iter().map(Self::from_value).collect()
    }

    /// Parses one requirements-file line. Blank lines and comments yield `None`.
    pub fn from_requirement(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some(match line.split_once("==") {
            Some((name, version)) => Self::pinned(name.trim(), version.trim()),
            None => Self::new(line),
        })
    }

    /// `name==version` as understood by pip.
    pub fn pip_spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}=={}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// `name=version` as understood by apt.
    pub fn apt_spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}={}", self.name, version),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pip_spec())
    }
}

/// Appends `extra` to `deps`, skipping names already present.
pub fn merge(deps: &mut Vec<Dependency>, extra: impl IntoIterator<Item = Dependency>) {
    for dep in extra {
        if !deps.iter().any(|d| d.name == dep.name) {
            deps.push(dep);
        }
    }
}
