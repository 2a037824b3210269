//! Webplay CLI: records browser traffic into scenario files and replays them.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{io, path::PathBuf};
use tracing::info;
use webplay::{
    FailureCollector, Recording, RecordingConfiguration, ReplayConfiguration, Replayer,
    ScenarioSource, DEFAULT_BASE_URL,
};

#[derive(Parser)]
#[command(name = "webplay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the traffic between a client and the application into a scenario file
    Record {
        /// Port to listen on for the client
        #[arg(short, long, default_value_t = 10011)]
        port: u16,

        /// Address of the application, as host:port
        #[arg(short, long, default_value = "localhost:9000")]
        app: String,

        /// Scenario file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Stop once this file is modified, instead of waiting for Enter
        #[arg(short, long, env = "WEBPLAY_STOP_FILE")]
        stop_file: Option<PathBuf>,

        /// MIME types whose payloads and form fields are recorded
        #[arg(long = "content-type", value_name = "MIME")]
        content_types: Vec<String>,

        /// Write the scenario without indentation
        #[arg(long)]
        compact: bool,
    },

    /// Replay a scenario file against the application
    Replay {
        /// Scenario file path or http(s) URL
        scenario: String,

        /// Base URL of the application
        #[arg(short, long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Record {
            port,
            app,
            output,
            stop_file,
            content_types,
            compact,
        } => {
            let mut configuration = RecordingConfiguration::new(port, app, output);
            if !content_types.is_empty() {
                configuration.set_included_content_types(content_types);
            }
            configuration.set_indent(!compact);
            if let Some(stop_file) = &stop_file {
                configuration.set_stop_file(stop_file);
            }

            let recording = Recording::open(configuration).context("failed to open the recording")?;
            recording.start()?;

            if stop_file.is_some() {
                recording.wait_till_stop()?;
            } else {
                println!("Press Enter to stop the recording.");
                io::stdin().read_line(&mut String::new())?;
                recording.stop()?;
            }
        }
        Commands::Replay { scenario, base_url } => {
            let source = if scenario.starts_with("http://") || scenario.starts_with("https://") {
                ScenarioSource::url(scenario)
            } else {
                ScenarioSource::path(scenario)
            };

            info!("Replaying {} against {}", scenario_name(&source), base_url);

            let mut collector = FailureCollector::default();
            let report = Replayer::new(ReplayConfiguration::new(base_url))
                .replay_blocking(&source, &mut collector)
                .context("failed to replay the scenario")?;

            for failure in &collector.failures {
                println!("{}\n", failure.message);
            }
            println!(
                "{} requests, {} assertions, {} failures",
                report.requests, report.assertions, report.failures
            );

            if !report.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn scenario_name(source: &ScenarioSource) -> String {
    match source {
        ScenarioSource::Path(path) => path.display().to_string(),
        ScenarioSource::Url(url) => url.clone(),
    }
}
