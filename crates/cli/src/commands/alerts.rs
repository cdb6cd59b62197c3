//! Alert CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{Alert, ApiClient};
use crate::output::{color_severity, print_json, print_success, render_table, OutputFormat};

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Keep alerts at or above `min_severity`
pub fn filter_by_severity(alerts: Vec<Alert>, min_severity: Option<&str>) -> Vec<Alert> {
    let Some(min) = min_severity else {
        return alerts;
    };
    let floor = severity_rank(min);
    alerts
        .into_iter()
        .filter(|a| severity_rank(&a.severity) >= floor)
        .collect()
}

fn severity_rank(severity: &str) -> u8 {
    match severity.to_lowercase().as_str() {
        "critical" => 2,
        "warning" => 1,
        _ => 0,
    }
}

/// Show the current alert list
pub async fn show_alerts(
    client: &ApiClient,
    min_severity: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let alerts = filter_by_severity(client.alerts().await?, min_severity);

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            if let [only] = alerts.as_slice() {
                if only.severity == "info" {
                    print_success(&only.message);
                    return Ok(());
                }
            }
            if alerts.is_empty() {
                print_success("No alerts at this severity");
                return Ok(());
            }

            let rows: Vec<AlertRow> = alerts
                .iter()
                .map(|a| AlertRow {
                    severity: color_severity(&a.severity),
                    kind: a.kind.clone(),
                    scope: a.scope.clone(),
                    message: a.message.clone(),
                })
                .collect();
            println!("{}", render_table(rows));
            println!("\nTotal: {} alerts", alerts.len());
        }
    }

    Ok(())
}
