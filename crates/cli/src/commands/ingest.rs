//! Send recorded telemetry to the server

use anyhow::{Context, Result};
use std::path::Path;

use crate::client::{ApiClient, IngestReport};
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Post every line of a newline-delimited JSON file
///
/// Lines that are not JSON are counted as rejected locally and never sent.
pub async fn ingest_file(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let report = ingest_lines(client, &content).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table if report.accepted + report.rejected == 0 => {
            print_info(&format!("No records found in {}", path.display()));
        }
        OutputFormat::Table => {
            print_success(&format!("Accepted {} records", report.accepted));
            if report.rejected > 0 {
                print_warning(&format!("Rejected {} records", report.rejected));
                for reason in &report.errors {
                    println!("  {}", reason);
                }
            }
        }
    }

    Ok(())
}

pub async fn ingest_lines(client: &ApiClient, content: &str) -> Result<IngestReport> {
    let mut total = IngestReport::default();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let body: serde_json::Value = match serde_json::from_str(line) {
            Ok(body) => body,
            Err(e) => {
                total.rejected += 1;
                total.errors.push(format!("line {}: {}", number + 1, e));
                continue;
            }
        };

        let report = client.ingest(&body).await?;
        total.accepted += report.accepted;
        total.rejected += report.rejected;
        total.errors.extend(
            report
                .errors
                .into_iter()
                .map(|e| format!("line {}: {}", number + 1, e)),
        );
    }

    Ok(total)
}
