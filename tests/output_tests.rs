// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_query_guard::{
    correction::{CorrectionService, CorrectionStrategy, Suggestion, security_suggestions},
    injection::RiskLevel,
    output::{
        OutputFormat, OutputOptions, TableSelection, format_corrections, format_security_report,
        format_suggestions, format_table_selection
    },
    selector::TableScore,
    validator::SecurityValidator
};

fn plain() -> OutputOptions {
    OutputOptions {
        colored: false,
        ..OutputOptions::default()
    }
}

fn with_format(format: OutputFormat) -> OutputOptions {
    OutputOptions {
        format,
        ..plain()
    }
}

fn selection() -> TableSelection {
    TableSelection {
        question: "revenue per customer".to_string(),
        selected: vec!["orders".to_string(), "customers".to_string(), "products".to_string()],
        scores:   vec![
            TableScore {
                table: "orders".to_string(),
                score: 0.61
            },
            TableScore {
                table: "customers".to_string(),
                score: 0.42
            }
        ]
    }
}

#[test]
fn test_output_options_default() {
    let opts = OutputOptions::default();
    assert_eq!(opts.format, OutputFormat::Text);
    assert!(opts.colored);
    assert!(!opts.verbose);
}

#[test]
fn test_safe_report_text() {
    let report = SecurityValidator::default().validate("SELECT id, name FROM t WHERE id=1 LIMIT 10;");
    let out = format_security_report(&report, &plain());
    assert!(out.starts_with("SAFE risk=SAFE score="));
    assert!(!out.contains("Violations:"));
}

#[test]
fn test_blocked_report_lists_violations() {
    let report = SecurityValidator::default().validate("SELECT * FROM orders");
    let out = format_security_report(&report, &plain());
    assert!(out.starts_with("BLOCKED"));
    assert!(out.contains("Violations:\n"));
    assert!(out.contains("  - SELECT queries must include LIMIT clause\n"));
    assert!(out.contains("Warnings:"));
}

#[test]
fn test_verbose_report_shows_recommendations() {
    let report = SecurityValidator::default().validate("SELECT * FROM orders");
    let opts = OutputOptions {
        verbose: true,
        ..plain()
    };
    let out = format_security_report(&report, &opts);
    assert!(out.contains("Recommendations:"));
    assert!(out.contains("Add LIMIT clause"));
}

#[test]
fn test_report_yaml() {
    let report = SecurityValidator::default().validate("DROP TABLE users");
    let out = format_security_report(&report, &with_format(OutputFormat::Yaml));
    assert!(out.contains("is_safe: false"));
    assert!(out.contains("risk_level: critical"));
}

#[test]
fn test_corrections_text_numbered() {
    let attempts = CorrectionService::default().correct(
        "SELCET * FORM orders",
        None,
        Some(CorrectionStrategy::Moderate)
    );
    let out = format_corrections("SELCET * FORM orders", "moderate", &attempts, &plain());
    assert!(out.starts_with("Correction #1 ["));
    assert!(out.contains("Applied: "));
    assert_eq!(out.matches("Correction #").count(), attempts.len());
}

#[test]
fn test_corrections_json() {
    let attempts =
        CorrectionService::default().correct("SELECT * FROM orders", None, Some(CorrectionStrategy::Moderate));
    let out = format_corrections(
        "SELECT * FROM orders",
        "moderate",
        &attempts,
        &with_format(OutputFormat::Json)
    );
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["query"], "SELECT * FROM orders");
    assert_eq!(value["strategy"], "moderate");
    assert_eq!(value["attempts"].as_array().unwrap().len(), attempts.len());
}

#[test]
fn test_empty_structured_corrections() {
    let out = format_corrections("SELECT 1", "conservative", &[], &with_format(OutputFormat::Json));
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert!(value["attempts"].as_array().unwrap().is_empty());
}

#[test]
fn test_security_suggestions_formatted() {
    let report = SecurityValidator::default().validate("SELECT * FROM orders");
    let suggestions = security_suggestions(&report);
    let out = format_suggestions(&suggestions, &plain());
    assert!(out.starts_with("[CRITICAL] security_violation: Security issue: "));
    assert!(out.contains("(100%)"));
}

#[test]
fn test_empty_suggestions() {
    assert_eq!(format_suggestions(&[], &plain()), "No suggestions\n");
}

#[test]
fn test_suggestions_json() {
    let suggestions = vec![Suggestion::new("index_hint", "Consider an index", 0.4)];
    let out = format_suggestions(&suggestions, &with_format(OutputFormat::Json));
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value[0]["kind"], "index_hint");
    assert_eq!(suggestions[0].severity, RiskLevel::Low);
}

#[test]
fn test_table_selection_text() {
    assert_eq!(
        format_table_selection(&selection(), &plain()),
        "orders (0.610)\ncustomers (0.420)\nproducts\n"
    );
}

#[test]
fn test_table_selection_verbose_scores() {
    let opts = OutputOptions {
        verbose: true,
        ..plain()
    };
    let out = format_table_selection(&selection(), &opts);
    assert!(out.contains("All scores:"));
    assert!(out.contains("orders"));
}

#[test]
fn test_table_selection_yaml() {
    let out = format_table_selection(&selection(), &with_format(OutputFormat::Yaml));
    assert!(out.contains("question: revenue per customer"));
    assert!(out.contains("- products"));
}
