use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "acpd-cli")]
#[command(about = "ACO cost-performance dashboard command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the dashboard API
    Serve,
    /// Apply schema migrations and exit
    Migrate,
    /// Wipe the database and reseed it from a baseline
    Reset {
        /// Seed from this YAML file instead of the builtin baseline
        #[arg(long, value_name = "PATH")]
        baseline: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            acpd_web::serve_from_env().await?;
        }
        Commands::Migrate => {
            let config = acpd_store::StoreConfig::from_env()?;
            let pool = acpd_store::connect(&config).await?;
            acpd_store::run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Commands::Reset { baseline } => {
            let config = acpd_store::StoreConfig::from_env()?;
            let pool = acpd_store::connect(&config).await?;
            acpd_store::run_migrations(&pool).await?;
            let baseline = match baseline {
                Some(path) => acpd_seed::Baseline::from_path(&path)?,
                None => acpd_seed::Baseline::builtin()?,
            };
            let summary = acpd_seed::reset_to_baseline(&pool, &baseline).await?;
            println!(
                "reset complete: run_id={} periods={} categories={} metrics={} opportunities={} recommendations={} resources={} kpis={} drilldown_rows={}",
                summary.run_id,
                summary.periods_created,
                summary.categories_created,
                summary.metrics_created,
                summary.opportunities_created,
                summary.recommendations_created,
                summary.resources_created,
                summary.kpis_created,
                summary.drilldown_rows_created,
            );
        }
    }

    Ok(())
}
