//! Markdown and JSON rendering of an outcome tree.
//!
//! The JSON rendering is exactly the document published to the record
//! store. The markdown rendering is a human summary with per-group
//! counts and a table of every recorded outcome.

use crate::models::{GroupRecord, Outcome, OutcomeTree, RunToken};
use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::Path;

/// Output format for a local copy of the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    /// Guess the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") | Some("markdown") => ReportFormat::Markdown,
            _ => ReportFormat::Json,
        }
    }
}

/// Outcome counts for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCounts {
    pub pass: usize,
    pub fail: usize,
    pub skipped: usize,
    pub other: usize,
}

impl GroupCounts {
    pub fn of(group: &GroupRecord) -> Self {
        let mut counts = Self::default();
        for check in group.checks.values() {
            for host in check.hosts.values() {
                match host.result {
                    Outcome::Pass => counts.pass += 1,
                    Outcome::Fail => counts.fail += 1,
                    Outcome::Skipped => counts.skipped += 1,
                    Outcome::Other(_) => counts.other += 1,
                }
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skipped + self.other
    }
}

/// Generate a Markdown summary of the tree.
pub fn generate_markdown_report(tree: &OutcomeTree, run_token: Option<&RunToken>) -> String {
    let mut output = String::new();

    output.push_str("# Trento Results\n\n");

    if let Some(token) = run_token {
        output.push_str(&format!("- **Run:** `{}`\n", token));
    }
    output.push_str(&format!(
        "- **Generated:** {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Groups:** {}\n", tree.groups().count()));
    output.push_str(&format!("- **Outcomes:** {}\n\n", tree.outcome_count()));

    output.push_str(&generate_summary_section(tree));
    output.push_str(&generate_groups_section(tree));

    output
}

fn generate_summary_section(tree: &OutcomeTree) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    if tree.is_empty() {
        section.push_str("No groups were recorded.\n\n");
        return section;
    }

    section.push_str(&format!(
        "| Group | {} Pass | {} Fail | {} Skipped | Other | **Total** |\n",
        Outcome::Pass.emoji(),
        Outcome::Fail.emoji(),
        Outcome::Skipped.emoji(),
    ));
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for (name, group) in tree.groups() {
        let counts = GroupCounts::of(group);
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | **{}** |\n",
            name,
            counts.pass,
            counts.fail,
            counts.skipped,
            counts.other,
            counts.total()
        ));
    }
    section.push('\n');

    section
}

fn generate_groups_section(tree: &OutcomeTree) -> String {
    let mut section = String::new();

    for (name, group) in tree.groups() {
        section.push_str(&format!("## {}\n\n", name));

        if group.checks.is_empty() {
            section.push_str("*No checks recorded for this group.*\n\n");
            continue;
        }

        section.push_str("| Check | Host | Result |\n");
        section.push_str("|:---|:---|:---:|\n");
        for (check, record) in &group.checks {
            for (host, outcome) in &record.hosts {
                section.push_str(&format!(
                    "| `{}` | {} | {} {} |\n",
                    check,
                    host,
                    outcome.result.emoji(),
                    outcome.result
                ));
            }
        }
        section.push('\n');
    }

    section
}

/// Generate the JSON document published for the tree.
pub fn generate_json_report(tree: &OutcomeTree) -> Result<String> {
    serde_json::to_string_pretty(tree).map_err(Into::into)
}

/// Render the tree in `format` and write it to `path`.
pub fn write_report(
    tree: &OutcomeTree,
    run_token: Option<&RunToken>,
    format: ReportFormat,
    path: &Path,
) -> Result<()> {
    let content = match format {
        ReportFormat::Json => generate_json_report(tree)?,
        ReportFormat::Markdown => generate_markdown_report(tree, run_token),
    };

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
