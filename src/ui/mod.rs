//! Terminal output helpers shared by the CLI commands.

pub mod icons;
pub mod progress;

pub use progress::Spinner;

use console::style;

use crate::errors::LabError;
use crate::orchestrator::ClusterInspection;
use crate::registry::ClusterDescriptor;

/// Lines of captured command output shown under an error.
const OUTPUT_TAIL_LINES: usize = 20;

/// One row of the cluster table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRow {
    pub name: String,
    pub provider: String,
    pub location: String,
    pub managed_by: String,
    pub created: String,
    /// Live phase and provider status, only for `list --live`.
    pub status: Option<String>,
}

impl From<&ClusterDescriptor> for ClusterRow {
    fn from(descriptor: &ClusterDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            provider: descriptor.provider.to_string(),
            location: descriptor.location.summary(),
            managed_by: descriptor.managed_by.to_string(),
            created: descriptor.created_at.format("%Y-%m-%d %H:%M").to_string(),
            status: None,
        }
    }
}

impl From<&ClusterInspection> for ClusterRow {
    fn from(inspection: &ClusterInspection) -> Self {
        let status = match &inspection.state {
            Some(state) => format!("{} ({})", inspection.phase, state.status),
            None => inspection.phase.to_string(),
        };
        Self {
            status: Some(status),
            ..ClusterRow::from(&inspection.descriptor)
        }
    }
}

impl ClusterRow {
    fn cells(&self) -> Vec<&str> {
        let mut cells = vec![
            self.name.as_str(),
            self.provider.as_str(),
            self.location.as_str(),
            self.managed_by.as_str(),
            self.created.as_str(),
        ];
        if let Some(status) = &self.status {
            cells.push(status);
        }
        cells
    }
}

/// Render rows as a left-aligned plain-text table.
///
/// A STATUS column is added when any row carries one.
pub fn cluster_table(rows: &[ClusterRow]) -> String {
    let mut header = vec!["NAME", "PROVIDER", "LOCATION", "MANAGED BY", "CREATED"];
    let with_status = rows.iter().any(|r| r.status.is_some());
    if with_status {
        header.push("STATUS");
    }

    let body: Vec<Vec<&str>> = rows
        .iter()
        .map(|row| {
            let mut cells = row.cells();
            if with_status && row.status.is_none() {
                cells.push("-");
            }
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for cells in &body {
        for (i, cell) in cells.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render = |cells: &[&str]| -> String {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == last {
                    cell.to_string()
                } else {
                    format!("{:<width$}", cell, width = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = render(&header);
    out.push('\n');
    for cells in &body {
        out.push_str(&render(cells));
        out.push('\n');
    }
    out
}

/// The last `max` lines of `output`, trimmed of trailing blank lines.
pub fn tail(output: &str, max: usize) -> Vec<&str> {
    let lines: Vec<&str> = output.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].to_vec()
}

/// Print an error with its cause chain to stderr.
///
/// When a failed external command is somewhere in the chain, the tail of
/// its captured output is shown as well.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", icons::CROSS, style(err).red().bold());
    for cause in err.chain().skip(1) {
        eprintln!("   {} {}", style("caused by:").dim(), cause);
    }

    let output = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<LabError>())
        .find_map(|lab| lab.command_output());
    if let Some(output) = output.filter(|o| !o.trim().is_empty()) {
        eprintln!();
        eprintln!("{}", style("Command output (last lines):").dim());
        for line in tail(output, OUTPUT_TAIL_LINES) {
            eprintln!("   {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ClusterPhase;
    use crate::provider::{ClusterState, Location, Provider};
    use crate::registry::ManagedBy;
    use std::path::PathBuf;

    fn descriptor(name: &str) -> ClusterDescriptor {
        ClusterDescriptor::new(
            name,
            Provider::Aws,
            Location::in_region("us-east-1"),
            PathBuf::from("/tmp/aws"),
            ManagedBy::Tool,
        )
    }

    #[test]
    fn test_table_aligns_columns() {
        let rows = vec![
            ClusterRow::from(&descriptor("a")),
            ClusterRow::from(&descriptor("much-longer-name")),
        ];
        let table = cluster_table(&rows);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(!lines[0].contains("STATUS"));
        let provider_col = lines[0].find("PROVIDER").unwrap();
        assert_eq!(lines[1].find("AWS").unwrap(), provider_col);
        assert_eq!(lines[2].find("AWS").unwrap(), provider_col);
        assert!(lines[1].contains("region us-east-1"));
    }

    #[test]
    fn test_table_with_live_status() {
        let inspection = ClusterInspection {
            descriptor: descriptor("live"),
            state: Some(ClusterState::new("ACTIVE")),
            phase: ClusterPhase::Ready,
        };
        let gone = ClusterInspection {
            descriptor: descriptor("gone"),
            state: None,
            phase: ClusterPhase::Absent,
        };
        let table = cluster_table(&[ClusterRow::from(&inspection), ClusterRow::from(&gone)]);

        assert!(table.lines().next().unwrap().ends_with("STATUS"));
        assert!(table.contains("ready (ACTIVE)"));
        assert!(table.lines().any(|l| l.starts_with("gone") && l.ends_with("absent")));
    }

    #[test]
    fn test_empty_table_is_header_only() {
        assert_eq!(cluster_table(&[]).lines().count(), 1);
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let output = "one\ntwo\nthree\nfour\n\n";
        assert_eq!(tail(output, 2), vec!["three", "four"]);
        assert_eq!(tail("short", 20), vec!["short"]);
        assert!(tail("", 5).is_empty());
    }
}
