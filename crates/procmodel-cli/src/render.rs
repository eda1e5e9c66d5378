//! Terminal rendering of findings.

use colored::Colorize;
use procmodel_core::report::cycle_path;
use procmodel_core::{Issue, Report, Severity, ValidationReport};

fn issue_line(issue: &Issue) -> String {
    let marker = match issue.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    };
    let location = if issue.location.is_empty() {
        String::new()
    } else {
        format!(" {}", issue.location.dimmed())
    };
    format!(
        "  {} [{}]{}: {}",
        marker,
        issue.category.to_string().cyan(),
        location,
        issue.message
    )
}

pub fn print_findings(findings: &ValidationReport) {
    for issue in findings.issues() {
        println!("{}", issue_line(issue));
    }
    if findings.is_clean() {
        println!("{}", "No issues found.".green());
    } else {
        println!(
            "{} errors, {} warnings",
            findings.errors.len().to_string().bold(),
            findings.warnings.len().to_string().bold()
        );
    }
}

/// Run summary on stderr, so stdout stays clean for JSON output.
pub fn print_report(report: &Report) {
    if let Some(stats) = &report.stats {
        eprintln!("{} {}", "model".green().bold(), stats);
    }
    for issue in report.errors.iter().chain(report.warnings.iter()) {
        eprintln!("{}", issue_line(issue));
    }
    for fix in &report.fixes {
        eprintln!("  {} {}", "fixed".blue().bold(), fix);
    }
    eprintln!("{}", report.summary().bold());
}

pub fn print_cycles(cycles: &[Vec<String>]) {
    if cycles.is_empty() {
        println!("{}", "No cycles.".green());
        return;
    }
    for cycle in cycles {
        println!("  {} {}", "cycle".yellow().bold(), cycle_path(cycle));
    }
    println!("{} cycles", cycles.len().to_string().bold());
}
