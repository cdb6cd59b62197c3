use anyhow::Result;
use clap::Parser;
use memwatch_cli::{
    client::ApiClient,
    commands::{alerts, fleet, ingest, systems},
    output::print_error,
    Cli, Commands, SystemCommands,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Systems => systems::list_systems(&client, cli.format).await?,
        Commands::System(system_cmd) => match system_cmd {
            SystemCommands::Summary { system_id } => {
                systems::show_summary(&client, &system_id, cli.format).await?;
            }
            SystemCommands::Latest { system_id } => {
                systems::show_latest(&client, &system_id, cli.format).await?;
            }
            SystemCommands::History { system_id, limit } => {
                systems::show_history(&client, &system_id, limit, cli.format).await?;
            }
            SystemCommands::Processes { system_id } => {
                systems::show_processes(&client, &system_id, cli.format).await?;
            }
        },
        Commands::Fleet => fleet::show_fleet(&client, cli.format).await?,
        Commands::Alerts { severity } => {
            alerts::show_alerts(&client, severity.as_deref(), cli.format).await?;
        }
        Commands::Health => fleet::show_health(&client, cli.format).await?,
        Commands::Ingest { file } => ingest::ingest_file(&client, &file, cli.format).await?,
    }

    Ok(())
}
