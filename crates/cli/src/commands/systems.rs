//! Per-system CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ProcessUsage, Snapshot, SystemSummary};
use crate::output::{
    color_status, format_flag, format_kb, format_mb, format_ratio, format_timestamp, print_json,
    print_warning, render_table, OutputFormat,
};

/// Row for the systems table
#[derive(Tabled)]
struct SystemRow {
    #[tabled(rename = "System")]
    system_id: String,
    #[tabled(rename = "Avg Memory")]
    average: String,
    #[tabled(rename = "Ratio")]
    ratio: String,
    #[tabled(rename = "Status")]
    bucket: String,
    #[tabled(rename = "Points")]
    data_points: usize,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

impl From<&SystemSummary> for SystemRow {
    fn from(s: &SystemSummary) -> Self {
        Self {
            system_id: s.system_id.clone(),
            average: format!("{} MB", s.average_mb_rounded),
            ratio: format_ratio(s.latest_ratio),
            bucket: color_status(&s.bucket),
            data_points: s.data_points,
            last_seen: format_timestamp(s.last_seen_secs),
        }
    }
}

/// Row for snapshot history
#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Allocated")]
    allocated: String,
    #[tabled(rename = "Free")]
    free: String,
    #[tabled(rename = "Ratio")]
    ratio: String,
    #[tabled(rename = "Process")]
    process: String,
    #[tabled(rename = "Leak?")]
    leak_suspect: String,
}

impl From<&Snapshot> for SnapshotRow {
    fn from(s: &Snapshot) -> Self {
        Self {
            timestamp: format_timestamp(s.timestamp_secs),
            allocated: format_kb(s.allocated_kb),
            free: format_kb(s.free_kb),
            ratio: format_ratio(s.ratio),
            process: s.process_name.clone().unwrap_or_else(|| "-".to_string()),
            leak_suspect: format_flag(s.leak_suspect),
        }
    }
}

/// Row for the per-process listing
#[derive(Tabled)]
struct ProcessRow {
    #[tabled(rename = "Process")]
    process_name: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Allocated")]
    allocated: String,
    #[tabled(rename = "Free")]
    free: String,
    #[tabled(rename = "Ratio")]
    ratio: String,
    #[tabled(rename = "Leak?")]
    leak_suspect: String,
}

impl From<&ProcessUsage> for ProcessRow {
    fn from(p: &ProcessUsage) -> Self {
        Self {
            process_name: p.process_name.clone(),
            pid: p.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".to_string()),
            allocated: format_mb(p.allocated_mb),
            free: format_mb(p.free_mb),
            ratio: format_ratio(p.ratio),
            leak_suspect: format_flag(p.leak_suspect),
        }
    }
}

/// List every known system with its summary
pub async fn list_systems(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let fleet = client.fleet().await?;

    match format {
        OutputFormat::Json => print_json(&fleet.systems)?,
        OutputFormat::Table => {
            if fleet.systems.is_empty() {
                print_warning("No systems have reported yet");
                return Ok(());
            }

            let rows: Vec<SystemRow> = fleet.systems.iter().map(SystemRow::from).collect();
            println!("{}", render_table(rows));
            println!("\nTotal: {} systems", fleet.systems.len());
        }
    }

    Ok(())
}

/// Show one system's summary and latest reading
pub async fn show_summary(client: &ApiClient, system_id: &str, format: OutputFormat) -> Result<()> {
    let summary = client.summary(system_id).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            let Some(summary) = summary else {
                print_warning(&format!("System '{}' has not reported", system_id));
                return Ok(());
            };

            println!("{}", "System Summary".bold());
            println!("{}", "=".repeat(50));
            println!("System:         {}", summary.system_id.cyan());
            println!("Status:         {}", color_status(&summary.bucket));
            println!(
                "Average Memory: {} ({})",
                format_mb(summary.average_mb),
                format!("~{} MB", summary.average_mb_rounded).dimmed()
            );
            println!("Latest Ratio:   {}", format_ratio(summary.latest_ratio));
            println!("Data Points:    {}", summary.data_points);
            println!("Last Seen:      {}", format_timestamp(summary.last_seen_secs));
        }
    }

    Ok(())
}

/// Show the latest snapshot for a system
pub async fn show_latest(client: &ApiClient, system_id: &str, format: OutputFormat) -> Result<()> {
    let latest = client.latest(system_id).await?;

    match format {
        OutputFormat::Json => print_json(&latest)?,
        OutputFormat::Table => match latest {
            Some(snapshot) => println!("{}", render_table(vec![SnapshotRow::from(&snapshot)])),
            None => print_warning(&format!("System '{}' has not reported", system_id)),
        },
    }

    Ok(())
}

/// Show recent snapshots, oldest first
pub async fn show_history(
    client: &ApiClient,
    system_id: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let history = client.history(system_id, limit).await?;

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.is_empty() {
                print_warning(&format!("No history for system '{}'", system_id));
                return Ok(());
            }

            let rows: Vec<SnapshotRow> = history.iter().map(SnapshotRow::from).collect();
            println!("{}", render_table(rows));
            println!("\nTotal: {} snapshots", history.len());
        }
    }

    Ok(())
}

/// Show the latest reading per process on a system
pub async fn show_processes(
    client: &ApiClient,
    system_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let processes = client.processes(system_id).await?;

    match format {
        OutputFormat::Json => print_json(&processes)?,
        OutputFormat::Table => {
            if processes.is_empty() {
                print_warning(&format!("No process data for system '{}'", system_id));
                return Ok(());
            }

            let rows: Vec<ProcessRow> = processes.iter().map(ProcessRow::from).collect();
            println!("{}", render_table(rows));
        }
    }

    Ok(())
}
