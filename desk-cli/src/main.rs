//! Agent Desk CLI
//!
//! One form, four specialised agents: web search, finance, book
//! recommendations and shopping.

mod page;
mod startup;
mod web;

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use desk_core::Persona;
use desk_runtime::Dispatcher;

use crate::startup::{build_dispatcher, BackendArgs};

#[derive(Parser)]
#[command(name = "agent-desk")]
#[command(author, version, about = "Agent Desk: an AI multi-agent system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the query form over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8501")]
        bind: SocketAddr,
    },

    /// Ask one agent a single question and print the answer
    Ask {
        /// Agent persona (web, finance, book_recommendation, shopping_partner)
        #[arg(short, long, default_value = "web")]
        persona: Persona,

        /// Company to analyse (finance persona only)
        #[arg(short, long)]
        company: Option<String>,

        /// The question or preferences
        #[arg(short, long, default_value = "")]
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    // Fails fast on missing credentials, before any surface is served
    let dispatcher = build_dispatcher(&cli.backend)?;

    match cli.command {
        Commands::Serve { bind } => web::serve(dispatcher, bind).await?,
        Commands::Ask {
            persona,
            company,
            query,
        } => ask(&dispatcher, persona, company.as_deref().unwrap_or(""), &query).await?,
    }

    Ok(())
}

async fn ask(dispatcher: &Dispatcher, persona: Persona, company: &str, query: &str) -> Result<()> {
    let query = match dispatcher.build_query(persona, company, query) {
        Ok(query) => query,
        Err(_) => anyhow::bail!("Please enter a valid company name!"),
    };

    eprintln!("🤖 {} is working on it...\n", persona.label());

    let document = dispatcher.dispatch(&query).await?;
    println!("{}", document.text());

    Ok(())
}
