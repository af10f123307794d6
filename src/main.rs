use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;
use tripflow::orchestrator::{BookingFlow, BookingOutcome, FlowStep};
use tripflow::server::AppState;
use tripflow::session::Mode;
use tripflow::{AmadeusClient, Config, OpenAiClient};

#[derive(Parser)]
#[command(name = "tripflow")]
#[command(about = "Conversational travel booking assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Book from a free-text request, answering questions on stdin
    Book {
        /// The booking request, e.g. "flight from Delhi to New York on Dec 20"
        query: String,
    },
    /// Book in one shot; missing fields fall back to defaults or stay empty
    Batch {
        query: String,
    },
    /// Run the HTTP booking server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate()?;

    match cli.command {
        Command::Book { query } => run_booking(&config, &query, Mode::Interactive).await,
        Command::Batch { query } => run_booking(&config, &query, Mode::Batch).await,
        Command::Serve { addr } => {
            let state = AppState::from_config(&config)?;
            tripflow::server::serve(addr, state).await?;
            Ok(())
        }
    }
}

async fn run_booking(config: &Config, query: &str, mode: Mode) -> anyhow::Result<()> {
    let llm = OpenAiClient::from_config(&config.llm)?;
    let vendor = AmadeusClient::from_config(&config.amadeus)?;
    let mut flow = BookingFlow::new(query, mode);

    let mut step = flow.begin(&llm, &vendor).await?;
    loop {
        match step {
            FlowStep::Suspended(point) => {
                println!("{}", point.prompt);
                print!("> ");
                io::stdout().flush()?;
                let mut answer = String::new();
                io::stdin().lock().read_line(&mut answer)?;
                step = flow.resume(&llm, &vendor, answer.trim()).await?;
            }
            FlowStep::Finished(outcome) => {
                print_outcome(&outcome)?;
                return Ok(());
            }
        }
    }
}

fn print_outcome(outcome: &BookingOutcome) -> anyhow::Result<()> {
    if !outcome.summary.is_empty() {
        println!("\n{}", outcome.summary);
    }
    println!("\n{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
