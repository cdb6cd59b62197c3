//! Fleet-wide and server health CLI commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::client::{ApiClient, BucketCounts, FleetView};
use crate::output::{color_status, format_mb, format_ratio, print_json, OutputFormat};

#[derive(Serialize)]
struct FleetReport {
    #[serde(flatten)]
    view: FleetView,
    health: BucketCounts,
}

/// Show fleet averages and the pressure breakdown
pub async fn show_fleet(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let view = client.fleet().await?;
    let health = client.fleet_health().await?;

    match format {
        OutputFormat::Json => print_json(&FleetReport { view, health })?,
        OutputFormat::Table => {
            println!("{}", "Fleet Overview".bold());
            println!("{}", "=".repeat(50));
            println!("Systems:        {}", view.systems.len());
            println!(
                "Average Memory: {} ({})",
                format_mb(view.average_mb),
                format!("~{} MB", view.average_mb_rounded).dimmed()
            );
            println!("Average Ratio:  {}", format_ratio(view.average_ratio));
            println!();
            println!("{}", "Memory Pressure".bold());
            println!("{}", "-".repeat(50));
            println!("{:<15} {}", color_status("healthy"), health.healthy);
            println!("{:<15} {}", color_status("warning"), health.warning);
            println!("{:<15} {}", color_status("critical"), health.critical);
        }
    }

    Ok(())
}

/// Show server component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Server Health".bold());
            println!("{}", "=".repeat(50));
            println!("Overall: {}", color_status(&health.status));
            println!();

            let mut components: Vec<_> = health.components.iter().collect();
            components.sort_by(|a, b| a.0.cmp(b.0));
            for (name, component) in components {
                match &component.message {
                    Some(message) => println!(
                        "{:<12} {}  {}",
                        name,
                        color_status(&component.status),
                        message.dimmed()
                    ),
                    None => println!("{:<12} {}", name, color_status(&component.status)),
                }
            }
        }
    }

    Ok(())
}
