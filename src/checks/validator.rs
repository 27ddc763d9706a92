//! Check ID validation.
//!
//! Every check must carry a unique, fixed-length hexadecimal id. The
//! validator scans each check directory, verifies the required metadata
//! and, in generate mode, mints ids for checks that do not have one yet.

use super::definition::CheckDefinition;
use crate::error::{DefinitionError, ValidationError};
use rand::Rng;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

/// Field holding the check id in the defaults document.
pub const CHECK_ID_FIELD: &str = "id";

/// Length of a check id.
pub const ID_LENGTH: usize = 6;

const HEXDIGITS: &[u8] = b"0123456789ABCDEF";

/// Fields every check definition must declare.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "id",
    "name",
    "group",
    "labels",
    "description",
    "remediation",
    "implementation",
];

/// An id minted in generate mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedId {
    pub path: PathBuf,
    pub id: String,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Number of check directories found.
    pub checks_scanned: usize,
    /// Ids that passed validation, in scan order.
    pub ids: Vec<String>,
    /// Directories without a defaults document.
    pub missing_defaults: Vec<PathBuf>,
    /// Ids appended in generate mode.
    pub generated: Vec<GeneratedId>,
}

/// Validates (and optionally assigns) check ids under a checks root.
pub struct IdValidator {
    root: PathBuf,
    generate: bool,
}

impl IdValidator {
    pub fn new(root: PathBuf, generate: bool) -> Self {
        Self { root, generate }
    }

    /// Scan the checks root. Stops at the first invalid check.
    pub fn run<R: Rng>(&self, rng: &mut R) -> Result<ValidationReport, ValidationError> {
        let mut report = ValidationReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<PathBuf> = Vec::new();

        for check_dir in self.check_dirs()? {
            info!("check directory found: {}", check_dir.display());
            report.checks_scanned += 1;

            let definition = match CheckDefinition::load(&check_dir) {
                Ok(definition) => definition,
                Err(DefinitionError::Read { path, source })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    error!("check {} doesn't have the defaults/main.yml file", check_dir.display());
                    report.missing_defaults.push(path);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !definition.has_field(CHECK_ID_FIELD) {
                info!(
                    "check {} doesn't have the {} value",
                    check_dir.display(),
                    CHECK_ID_FIELD
                );
                if self.generate {
                    pending.push(definition.path().to_path_buf());
                    continue;
                }
                return Err(ValidationError::MissingId {
                    path: definition.path().to_path_buf(),
                });
            }

            let id = sanity_check(&definition)?;
            if !seen.insert(id.clone()) {
                return Err(ValidationError::DuplicateId {
                    id,
                    path: definition.path().to_path_buf(),
                });
            }
            report.ids.push(id);
        }

        if self.generate && !pending.is_empty() {
            info!("generating new ids...");
            for path in pending {
                let mut new_id = create_id(rng);
                while seen.contains(&new_id) {
                    new_id = create_id(rng);
                }
                seen.insert(new_id.clone());

                append_id(&path, &new_id)?;
                info!("new id {} added to check {}", new_id, path.display());
                report.generated.push(GeneratedId { path, id: new_id });
            }
        }

        Ok(report)
    }

    /// Check directories directly under the root, sorted by name.
    fn check_dirs(&self) -> Result<Vec<PathBuf>, ValidationError> {
        let mut dirs = Vec::new();

        // symlinked check directories count as checks
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| ValidationError::Scan {
                path: self.root.clone(),
                source,
            })?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            }
        }

        Ok(dirs)
    }
}

/// Whether `id` is an `ID_LENGTH` string of uppercase hex digits.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| HEXDIGITS.contains(&b))
}

/// A fresh random id.
pub fn create_id<R: Rng>(rng: &mut R) -> String {
    (0..ID_LENGTH)
        .map(|_| HEXDIGITS[rng.gen_range(0..HEXDIGITS.len())] as char)
        .collect()
}

fn sanity_check(definition: &CheckDefinition) -> Result<String, ValidationError> {
    for field in REQUIRED_FIELDS {
        if !definition.has_field(field) {
            return Err(ValidationError::MissingField {
                path: definition.path().to_path_buf(),
                field: field.to_string(),
            });
        }
    }

    let id = definition.scalar(CHECK_ID_FIELD).unwrap_or_default();
    if !is_valid_id(&id) {
        return Err(ValidationError::MalformedId {
            path: definition.path().to_path_buf(),
            id,
            length: ID_LENGTH,
        });
    }

    Ok(id)
}

fn append_id(path: &Path, id: &str) -> Result<(), ValidationError> {
    let append_err = |source| ValidationError::Append {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(append_err)?;

    write!(
        file,
        "\n# check {}. This value must not be changed over the life of this check\n{}: \"{}\"\n",
        CHECK_ID_FIELD, CHECK_ID_FIELD, id
    )
    .map_err(append_err)
}
