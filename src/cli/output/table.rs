//! Table output formatting for CLI commands
//!
//! Renders agents and sync results with comfy-table. Colors are dropped
//! when `NO_COLOR` is set or the terminal is dumb.

use crate::domain::models::CachedAgent;
use crate::services::{SourceOutcome, SourceReport, SourceStatus};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Format cached agents as a table
    pub fn format_agents(&self, agents: &[CachedAgent]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Global ID", "Name", "Owner", "Tier", "Score", "Expires"]));

        for agent in agents {
            let score_cell = match agent.quality_score {
                Some(score) if self.use_colors => Cell::new(format!("{score:.1}")).fg(score_color(score)),
                Some(score) => Cell::new(format!("{score:.1}")),
                None => Cell::new("-"),
            };

            table.add_row(vec![
                Cell::new(truncate(&agent.global_id, 40)),
                Cell::new(truncate(&agent.name, 40)),
                Cell::new(truncate(&agent.owner, 20)),
                Cell::new(agent.trust_tier.map_or_else(|| "-".to_string(), |t| t.to_string())),
                score_cell,
                Cell::new(agent.expires_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        table.to_string()
    }

    /// Format the per-source outcomes of one sync pass
    pub fn format_sync_report(&self, sources: &[SourceReport]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Source", "Outcome", "Pages", "Records", "Error"]));

        for report in sources {
            let (pages, records, error) = match &report.outcome {
                SourceOutcome::Synced { pages, records } | SourceOutcome::Interrupted { pages, records } => {
                    (pages.to_string(), records.to_string(), String::new())
                }
                SourceOutcome::FetchFailed { error, pages, records } => {
                    (pages.to_string(), records.to_string(), truncate(error, 50))
                }
                SourceOutcome::StoreFailed { error } => ("-".to_string(), "-".to_string(), truncate(error, 50)),
                SourceOutcome::Unavailable | SourceOutcome::Skipped => {
                    ("-".to_string(), "-".to_string(), String::new())
                }
            };

            let label = outcome_label(&report.outcome);
            let outcome_cell = if self.use_colors {
                Cell::new(label).fg(outcome_color(&report.outcome))
            } else {
                Cell::new(label)
            };

            table.add_row(vec![
                Cell::new(&report.source),
                outcome_cell,
                Cell::new(pages),
                Cell::new(records),
                Cell::new(error),
            ]);
        }

        table.to_string()
    }

    /// Format source sync state snapshots
    pub fn format_source_status(&self, statuses: &[SourceStatus]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Source",
            "Chain",
            "State",
            "Circuit",
            "Last Outcome",
            "Records",
            "Last Sync",
            "Last Error",
        ]));

        for status in statuses {
            let circuit = match status.retry_after {
                Some(at) => format!("{} until {}", status.circuit.as_str(), at.format("%H:%M:%S")),
                None => status.circuit.as_str().to_string(),
            };
            table.add_row(vec![
                Cell::new(&status.name),
                Cell::new(status.chain_prefix.as_str()),
                Cell::new(status.state.as_str()),
                Cell::new(circuit),
                Cell::new(status.last_outcome.as_ref().map_or("-", outcome_label)),
                Cell::new(status.records_synced),
                Cell::new(
                    status
                        .last_sync_at
                        .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                ),
                Cell::new(status.last_error.as_deref().map_or_else(String::new, |e| truncate(e, 40))),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(columns: &[&str]) -> Vec<Cell> {
    columns
        .iter()
        .map(|c| Cell::new(c).add_attribute(Attribute::Bold))
        .collect()
}

fn score_color(score: f64) -> Color {
    if score >= 70.0 {
        Color::Green
    } else if score >= 40.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn outcome_label(outcome: &SourceOutcome) -> &'static str {
    match outcome {
        SourceOutcome::Synced { .. } => "synced",
        SourceOutcome::Interrupted { .. } => "interrupted",
        SourceOutcome::Unavailable => "unavailable",
        SourceOutcome::Skipped => "skipped (circuit open)",
        SourceOutcome::FetchFailed { .. } => "fetch failed",
        SourceOutcome::StoreFailed { .. } => "store failed",
    }
}

fn outcome_color(outcome: &SourceOutcome) -> Color {
    match outcome {
        SourceOutcome::Synced { .. } => Color::Green,
        SourceOutcome::Interrupted { .. } | SourceOutcome::Unavailable | SourceOutcome::Skipped => Color::Yellow,
        SourceOutcome::FetchFailed { .. } | SourceOutcome::StoreFailed { .. } => Color::Red,
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChainPrefix;
    use chrono::Utc;

    fn agent(id: &str, name: &str, score: Option<f64>) -> CachedAgent {
        CachedAgent {
            global_id: id.to_string(),
            chain_prefix: ChainPrefix::Sol,
            raw_id: id.trim_start_matches("sol:").to_string(),
            name: name.to_string(),
            owner: "owner".to_string(),
            trust_tier: Some(2),
            quality_score: score,
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_agents_plain() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let out = formatter.format_agents(&[agent("sol:a", "Alpha", Some(81.25)), agent("sol:b", "Beta", None)]);

        assert!(out.contains("Global ID"));
        assert!(out.contains("sol:a"));
        assert!(out.contains("81.2") || out.contains("81.3"));
        assert!(out.contains("Beta"));
    }

    #[test]
    fn test_format_sync_report_plain() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let out = formatter.format_sync_report(&[
            SourceReport {
                source: "base".to_string(),
                outcome: SourceOutcome::Synced { pages: 2, records: 150 },
            },
            SourceReport {
                source: "sol".to_string(),
                outcome: SourceOutcome::Skipped,
            },
            SourceReport {
                source: "near".to_string(),
                outcome: SourceOutcome::Interrupted { pages: 1, records: 42 },
            },
        ]);

        assert!(out.contains("synced"));
        assert!(out.contains("150"));
        assert!(out.contains("skipped (circuit open)"));
        assert!(out.contains("interrupted"));
        assert!(out.contains("42"));
    }
}
