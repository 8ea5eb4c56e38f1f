//! CLI for the protogate REST gateway.
//!
//! Provides commands for:
//! - serve: Assemble routes and serve them over HTTP
//! - routes: Print the route table without serving
//! - gen: Compile .proto files into a descriptor tree

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use commands::{gen, routes, serve};
use protogate_gateway::GatewayError;

#[derive(Parser)]
#[command(name = "protogate")]
#[command(about = "REST gateway synthesized from annotated protobuf services", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gateway
    Serve(serve::ServeArgs),
    /// Print the route table
    Routes(routes::RoutesArgs),
    /// Compile .proto files into a descriptor tree
    Gen(gen::GenArgs),
}

/// Configuration and startup failures exit with 2, everything else with 1
fn exit_code(error: &anyhow::Error) -> i32 {
    let startup = error.chain().any(|cause| {
        cause
            .downcast_ref::<GatewayError>()
            .map_or(false, GatewayError::is_startup)
    });
    if startup {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_json) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Routes(args) => routes::run(args),
        Commands::Gen(args) => gen::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
