pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;

use agent::AgentRegistry;
use cli::Args;
use config::prompt::load_instructions;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Agent Backend: {}", args.agent_backend);
    info!("Agent Base URL: {}", args.agent_base_url.as_deref().unwrap_or("adapter default"));
    info!("General Agent: {}", args.general_agent_id);
    info!("Donor Meeting Agent: {}", args.donor_agent_id);
    info!("Instructions Path: {}", args.instructions_path.as_deref().unwrap_or("built-in"));
    info!("Agent Timeout: {}s", args.agent_timeout_secs);
    info!("Rate Limit: {}/s", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let instructions = load_instructions(args.instructions_path.as_deref())?;
    let agents = AgentRegistry::from_args(&args, &instructions)?;
    let state = AppState::from_args(&args, agents);

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await?;

    Ok(())
}
