//! Error types for aggregation and publishing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while folding engine events into the outcome tree.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// A result or skip event lacks a field it must carry.
    #[error("Malformed event from host {host}: missing {field}")]
    MalformedEvent { host: String, field: String },

    /// A skipped check's definition could not be read.
    #[error(transparent)]
    DefinitionReadFailure(#[from] DefinitionError),

    /// A lifecycle signal arrived in a state that does not accept it.
    #[error("Unexpected {event} event while {state}")]
    UnexpectedEvent { state: String, event: String },
}

impl AggregateError {
    pub fn malformed(host: &str, field: &str) -> Self {
        AggregateError::MalformedEvent {
            host: host.to_string(),
            field: field.to_string(),
        }
    }
}

/// Errors raised while reading a check definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read check definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse check definition {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Check definition {path} has no {field} field")]
    MissingField { path: PathBuf, field: String },
}

/// Errors raised by the remote record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("Record store unavailable during {operation}: {source}")]
    RemoteUnavailable {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with a non-success status.
    #[error("Record store returned {status} during {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The store's response could not be decoded.
    #[error("Unexpected record store response during {operation}: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },

    /// No run in the store matches the run token.
    #[error("No run found for token {0}")]
    RunNotFound(String),
}

/// Errors raised while reading an engine event log.
#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("Failed to read event log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid event on line {line}: {source}")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Reasons the check ID validation fails.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Failed to scan checks directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Check {path} has no id; use --generate to add new ids")]
    MissingId { path: PathBuf },

    #[error("Field {field} not found in check {path}")]
    MissingField { path: PathBuf, field: String },

    #[error("{path} id ({id}) does not follow the id syntax ({length} chars length hex string)")]
    MalformedId {
        path: PathBuf,
        id: String,
        length: usize,
    },

    #[error("id {id} already exists! (found again in {path})")]
    DuplicateId { id: String, path: PathBuf },

    #[error("Failed to append id to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
