use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::{
    correction::{CorrectionAttempt, Suggestion},
    injection::RiskLevel,
    selector::TableScore,
    validator::SecurityReport
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Correction attempts for one query, for serialization
#[derive(Debug, Serialize)]
pub struct CorrectionResult<'a> {
    pub query:    &'a str,
    pub strategy: &'a str,
    pub attempts: &'a [CorrectionAttempt]
}

/// Outcome of a table selection, for serialization
#[derive(Debug, Clone, Serialize)]
pub struct TableSelection {
    pub question: String,
    pub selected: Vec<String>,
    pub scores:   Vec<TableScore>
}

fn structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(serde_json::to_string_pretty(value).unwrap_or_default()),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value).unwrap_or_default()),
        OutputFormat::Text => None
    }
}

fn paint(text: &str, opts: &OutputOptions, style: fn(&str) -> ColoredString) -> String {
    if opts.colored {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

fn risk_label(level: RiskLevel, opts: &OutputOptions) -> String {
    let label = level.as_str().to_uppercase();
    if !opts.colored {
        return label;
    }
    match level {
        RiskLevel::Safe => label.green().to_string(),
        RiskLevel::Low => label.cyan().to_string(),
        RiskLevel::Medium => label.yellow().to_string(),
        RiskLevel::High => label.red().to_string(),
        RiskLevel::Critical => label.red().bold().to_string()
    }
}

/// Format a validation report based on output options
pub fn format_security_report(report: &SecurityReport, opts: &OutputOptions) -> String {
    if let Some(out) = structured(report, opts.format) {
        return out;
    }

    let mut out = String::new();
    let verdict = if report.is_safe {
        paint("SAFE", opts, |s| s.green().bold())
    } else {
        paint("BLOCKED", opts, |s| s.red().bold())
    };
    out.push_str(&format!(
        "{} risk={} score={} hash={}\n",
        verdict,
        risk_label(report.risk_level, opts),
        report.risk_score,
        report.query_hash
    ));

    if !report.violations.is_empty() {
        out.push_str(&paint("Violations:", opts, |s| s.red()));
        out.push('\n');
        for violation in &report.violations {
            out.push_str(&format!("  - {}\n", violation));
        }
    }
    if !report.warnings.is_empty() {
        out.push_str(&paint("Warnings:", opts, |s| s.yellow()));
        out.push('\n');
        for warning in &report.warnings {
            out.push_str(&format!("  - {}\n", warning));
        }
    }
    if opts.verbose && !report.recommendations.is_empty() {
        out.push_str("Recommendations:\n");
        for rec in &report.recommendations {
            out.push_str(&format!("  - {}\n", rec));
        }
    }
    if opts.verbose && report.whitelisted {
        out.push_str("Matches a known safe query shape\n");
    }
    out
}

/// Format ranked correction attempts
pub fn format_corrections(
    query: &str,
    strategy: &str,
    attempts: &[CorrectionAttempt],
    opts: &OutputOptions
) -> String {
    let result = CorrectionResult {
        query,
        strategy,
        attempts
    };
    if let Some(out) = structured(&result, opts.format) {
        return out;
    }

    if attempts.is_empty() {
        return "No corrections needed\n".to_string();
    }

    let mut out = String::new();
    for (i, attempt) in attempts.iter().enumerate() {
        let header = format!(
            "Correction #{} [{}] confidence {:.0}%",
            i + 1,
            attempt.source,
            attempt.confidence * 100.0
        );
        out.push_str(&paint(&header, opts, |s| s.cyan().bold()));
        out.push('\n');
        out.push_str(&format!("{}\n", attempt.corrected_query));
        if !attempt.corrections_applied.is_empty() {
            out.push_str(&format!("Applied: {}\n", attempt.corrections_applied.join("; ")));
        }
        if opts.verbose {
            out.push_str(&format!(
                "Estimated success: {:.0}%\n",
                attempt.estimated_success_rate * 100.0
            ));
        }
        out.push('\n');
    }
    out
}

/// Format advisory suggestions
pub fn format_suggestions(suggestions: &[Suggestion], opts: &OutputOptions) -> String {
    if let Some(out) = structured(suggestions, opts.format) {
        return out;
    }
    if suggestions.is_empty() {
        return "No suggestions\n".to_string();
    }

    let mut out = String::new();
    for suggestion in suggestions {
        out.push_str(&format!(
            "[{}] {}: {} ({:.0}%)\n",
            risk_label(suggestion.severity, opts),
            suggestion.kind,
            suggestion.description,
            suggestion.confidence * 100.0
        ));
    }
    out
}

/// Format a table selection
pub fn format_table_selection(selection: &TableSelection, opts: &OutputOptions) -> String {
    if let Some(out) = structured(selection, opts.format) {
        return out;
    }

    let mut out = String::new();
    for table in &selection.selected {
        let score = selection
            .scores
            .iter()
            .find(|s| &s.table == table)
            .map(|s| format!(" ({:.3})", s.score))
            .unwrap_or_default();
        out.push_str(&format!("{}{}\n", paint(table, opts, |s| s.bold()), score));
    }
    if opts.verbose && !selection.scores.is_empty() {
        out.push_str("\nAll scores:\n");
        for score in &selection.scores {
            out.push_str(&format!("  {:<24} {:.3}\n", score.table, score.score));
        }
    }
    out
}
