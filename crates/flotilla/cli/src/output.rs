//! Output formatting utilities

use crate::simulate::SimulationReport;
use colored::*;
use flotilla_types::{Deployment, Event, EventSeverity};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary and tables
    #[default]
    Text,
    /// JSON format
    Json,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Assembly")]
    assembly: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Profile")]
    profile: String,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Summary")]
    summary: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn instance_rows(deployment: &Deployment) -> Vec<InstanceRow> {
    deployment
        .instances
        .iter()
        .map(|i| InstanceRow {
            assembly: i.assembly.clone(),
            state: i.state.to_string(),
            account: i
                .provider_account
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            profile: i
                .placement
                .as_ref()
                .map(|p| p.hardware_profile.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

fn event_rows(events: &[Event]) -> Vec<EventRow> {
    events
        .iter()
        .map(|e| EventRow {
            time: e.timestamp.format("%H:%M:%S%.3f").to_string(),
            severity: match e.severity {
                EventSeverity::Info => "info".normal().to_string(),
                EventSeverity::Warning => "warning".yellow().to_string(),
                EventSeverity::Error => "error".red().to_string(),
                EventSeverity::Critical => "critical".red().bold().to_string(),
            },
            status: e.status.to_string(),
            summary: e.summary.clone(),
            description: e.description.clone().unwrap_or_default(),
        })
        .collect()
}

/// Print a simulation report in the specified format
pub fn print_report(report: &SimulationReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text => {
            match (&report.deployment_id, &report.deployment) {
                (None, _) => print_warning("Deployment was not created"),
                (Some(id), None) => print_success(&format!("Deployment {id} was destroyed")),
                (Some(_), Some(deployment)) => {
                    print_info(&format!(
                        "Deployment {} ({}) is {}",
                        deployment.name,
                        deployment.id,
                        deployment.state().to_string().bold()
                    ));
                    println!("{}", Table::new(instance_rows(deployment)));
                }
            }

            if !report.events.is_empty() {
                println!("{}", Table::new(event_rows(&report.events)));
            }
            for error in &report.errors {
                print_error(error);
            }
            Ok(())
        }
    }
}

/// Print a single item as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
