//! Rendering of a finished outcome tree.

pub mod generator;

pub use generator::{write_report, GroupCounts, ReportFormat};
