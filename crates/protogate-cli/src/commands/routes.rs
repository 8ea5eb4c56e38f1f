//! Route table command

use super::{build_gateway, ConfigArgs};
use anyhow::Result;
use clap::Args;
use protogate_gateway::MountedRoute;
use serde_json::json;

#[derive(Args, Debug)]
pub struct RoutesArgs {
    #[command(flatten)]
    pub source: ConfigArgs,

    /// Print the routes as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the OpenAPI document instead of the route table
    #[arg(long, conflicts_with = "json")]
    pub openapi: bool,
}

pub fn run(args: RoutesArgs) -> Result<()> {
    let config = args.source.load()?;
    let gateway = build_gateway(&config)?;

    if args.openapi {
        println!("{}", gateway.openapi_json()?);
    } else if args.json {
        let routes: Vec<_> = gateway
            .routes()
            .iter()
            .map(|r| {
                json!({
                    "method": r.method.as_str(),
                    "path": r.path,
                    "endpoint": r.endpoint,
                    "rpc": format!("{}/{}", r.service, r.procedure),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&routes)?);
    } else {
        print!("{}", format_table(gateway.routes()));
    }
    Ok(())
}

fn format_table(routes: &[MountedRoute]) -> String {
    let width = routes.iter().map(|r| r.path.len()).max().unwrap_or(0);
    let mut out = String::new();
    for route in routes {
        out.push_str(&format!(
            "{:<6} {:<width$}  {}/{}\n",
            route.method.as_str(),
            route.path,
            route.service,
            route.procedure,
            width = width
        ));
    }
    out
}
