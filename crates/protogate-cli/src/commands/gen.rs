//! Descriptor generation command

use anyhow::{Context, Result};
use clap::Args;
use protogate_gateway::ProtoCompiler;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct GenArgs {
    /// Proto files to compile
    #[arg(required = true)]
    pub protos: Vec<PathBuf>,

    /// Include directories for proto imports
    #[arg(short = 'I', long = "include")]
    pub includes: Vec<PathBuf>,

    /// Descriptor tree root
    #[arg(short, long, default_value = "descriptors")]
    pub out: PathBuf,

    /// protoc binary to use instead of the bundled one
    #[arg(long, env = "PROTOC")]
    pub protoc: Option<PathBuf>,
}

pub fn run(args: GenArgs) -> Result<()> {
    for proto in &args.protos {
        if !proto.is_file() {
            anyhow::bail!("Proto file not found: {}", proto.display());
        }
    }
    for include in &args.includes {
        if !include.is_dir() {
            anyhow::bail!("Include directory not found: {}", include.display());
        }
    }

    let mut compiler = ProtoCompiler::new(&args.out);
    for include in &args.includes {
        compiler = compiler.include(include);
    }
    if let Some(protoc) = &args.protoc {
        compiler = compiler.protoc(protoc);
    }

    let outputs = compiler
        .compile_all(&args.protos)
        .context("Failed to compile proto files")?;
    for output in outputs {
        println!("{}", output.display());
    }
    Ok(())
}
