//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use sitecheck_common::{BatchSummary, SessionReport, Severity, Verdict};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for SessionReport {
    fn headers() -> Vec<&'static str> {
        vec!["URL", "Verdict", "Source", "Pages", "Tested", "Broken", "Failures", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            verdict_label(self.verdict),
            self.source.to_string(),
            self.metrics.pages_visited.to_string(),
            self.metrics.tested_elements.to_string(),
            self.metrics.broken_elements.to_string(),
            self.failures.len().to_string(),
            self.reason.clone().unwrap_or_default(),
        ]
    }
}

pub fn verdict_label(verdict: Verdict) -> String {
    match verdict {
        Verdict::Pass => "PASS".green().bold().to_string(),
        Verdict::Fail => "FAIL".red().bold().to_string(),
    }
}

fn severity_label(severity: Severity) -> String {
    let text = severity.to_string();
    match severity {
        Severity::Critical => text.red().bold().to_string(),
        Severity::High => text.red().to_string(),
        Severity::Medium => text.yellow().to_string(),
        Severity::Low => text.dimmed().to_string(),
    }
}

/// Render a list of items as a table
pub fn render_table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

/// Serialize an item in a machine-readable format
pub fn render_structured<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(item)?,
        OutputFormat::Json | OutputFormat::Table => serde_json::to_string_pretty(item)?,
    })
}

/// Failure and warning lines shown under a report
fn report_details(report: &SessionReport) -> Vec<String> {
    let failures = report.failures.iter().map(|failure| {
        format!(
            "  [{}] {} {} ({})",
            severity_label(failure.severity),
            failure.kind,
            failure.message,
            failure.page_url
        )
    });
    let warnings = report
        .warnings
        .iter()
        .map(|warning| format!("  [{}] {}", "warning".yellow(), warning.message));
    failures.chain(warnings).collect()
}

/// Print the outcome of a batch
pub fn print_summary(summary: &BatchSummary, format: OutputFormat) -> anyhow::Result<()> {
    if format != OutputFormat::Table {
        println!("{}", render_structured(summary, format)?);
        return Ok(());
    }

    if summary.reports.is_empty() {
        println!("No sites tested.");
        return Ok(());
    }

    println!("{}", render_table(&summary.reports));

    for report in &summary.reports {
        let details = report_details(report);
        if details.is_empty() {
            continue;
        }
        println!();
        println!("{} {}", verdict_label(report.verdict), report.url.bold());
        for line in details {
            println!("{}", line);
        }
    }

    println!();
    let line = format!(
        "{}/{} passed in {:.1}s",
        summary.passed,
        summary.total,
        summary.duration_ms as f64 / 1000.0
    );
    if summary.failed == 0 {
        print_success(&line);
    } else {
        print_error(&line);
    }
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message);
}
