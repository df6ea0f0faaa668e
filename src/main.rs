#![deny(unused_must_use)]
mod analyzer;
mod api;
mod augment;
mod centrality;
mod config;
mod database;
mod error;
mod link_statistics;
mod observer;
mod path_split;
mod protocol;
mod reliability;
mod sensors;
mod services;
mod state;
mod store;
mod topology;
mod topology_centrality;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use analyzer::Analyzer;
use api::{AnalyzerHandle, ApiState};
use observer::Observer;
use sensors::{sensor_catalogue, ControllerClient};
use state::ProgramState;

#[derive(Parser)]
#[command(name = "sdnscope", about = "Periodic observer and analyzer for software-defined networks")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Run a single observation tick / analysis pass and exit
    #[arg(short, long, global = true)]
    single: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store schema
    Setup,
    /// Drop and recreate the store schema, discarding all data
    Reset,
    /// Poll the controller on the configured cadence
    #[command(alias = "observer")]
    Observe,
    /// Serve analysis tasks (or run them all once with --single)
    #[command(alias = "analyzer")]
    Analyze,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = config::Config::load()?;
    tracing::debug!("starting sdnscope");

    match cli.command {
        Command::Setup => {
            let db = database::open(&config.connection_string)?;
            let conn = db.lock().await;
            database::init_schema(&conn)?;
            println!(
                "Successfully set up the store. You can now use `sdnscope observe` and \
                 `sdnscope analyze` to monitor your network."
            );
        }
        Command::Reset => {
            let db = database::open(&config.connection_string)?;
            let conn = db.lock().await;
            database::drop_schema(&conn)?;
            database::init_schema(&conn)?;
            println!(
                "Successfully reset the store. All previously gathered data has been discarded."
            );
        }
        Command::Observe => {
            let db = database::open(&config.connection_string)?;
            let state = ProgramState::new("observer");

            let _api = tokio::spawn(api::serve(
                config.api.port + 1,
                ApiState {
                    state: state.clone(),
                    username: config.api.username.clone(),
                    password: config.api.password.clone(),
                    analyzer: None,
                },
            ));

            let client = ControllerClient::new(&config.controller.host, config.controller.port);
            let mut observer = Observer::new(db, sensor_catalogue(&client), config.poll_interval);
            observer.observe(cli.single, state).await?;
        }
        Command::Analyze => {
            let db = database::open(&config.connection_string)?;
            let state = ProgramState::new("analyzer");
            let handle = Arc::new(AnalyzerHandle {
                analyzer: Analyzer::new(),
                db: db.clone(),
            });

            let _api = tokio::spawn(api::serve(
                config.api.port + 2,
                ApiState {
                    state: state.clone(),
                    username: config.api.username.clone(),
                    password: config.api.password.clone(),
                    analyzer: Some(handle.clone()),
                },
            ));

            if cli.single {
                let mut conn = db.lock().await;
                handle.analyzer.run(&mut conn, "all")?;
            } else {
                // runs are triggered through the admin endpoint
                futures::future::pending::<()>().await;
            }
        }
    }

    tracing::debug!("shut down");
    Ok(())
}
