//! Check definition documents.
//!
//! Every check lives in its own directory and declares its metadata in
//! `defaults/main.yml`.

use crate::error::DefinitionError;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Location of the defaults document inside a check directory.
pub const DEFAULTS_FILE: &str = "defaults/main.yml";

/// Field of the defaults document that the run records results under.
pub const EXTERNAL_ID_FIELD: &str = "external_id";

/// Parsed `defaults/main.yml` of one check.
#[derive(Debug, Clone)]
pub struct CheckDefinition {
    path: PathBuf,
    fields: Mapping,
}

impl CheckDefinition {
    /// Path of the defaults document for the check rooted at `check_root`.
    pub fn defaults_path(check_root: &Path) -> PathBuf {
        check_root.join(DEFAULTS_FILE)
    }

    /// Load the definition of the check rooted at `check_root`.
    pub fn load(check_root: &Path) -> Result<Self, DefinitionError> {
        let path = Self::defaults_path(check_root);
        let content = std::fs::read_to_string(&path).map_err(|source| DefinitionError::Read {
            path: path.clone(),
            source,
        })?;

        Self::parse(path, &content)
    }

    /// Parse a defaults document. An empty document has no fields.
    pub fn parse(path: PathBuf, content: &str) -> Result<Self, DefinitionError> {
        let value: Value = serde_yaml::from_str(content).map_err(|source| DefinitionError::Parse {
            path: path.clone(),
            source,
        })?;

        let fields = match value {
            Value::Mapping(fields) => fields,
            _ => Mapping::new(),
        };

        Ok(Self { path, fields })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// A scalar field rendered as a string.
    pub fn scalar(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Required scalar field.
    pub fn require(&self, field: &str) -> Result<String, DefinitionError> {
        self.scalar(field).ok_or_else(|| DefinitionError::MissingField {
            path: self.path.clone(),
            field: field.to_string(),
        })
    }
}

/// Resolve the identifier results are recorded under for a check.
pub fn resolve_check_id(check_root: &Path) -> Result<String, DefinitionError> {
    CheckDefinition::load(check_root)?.require(EXTERNAL_ID_FIELD)
}
