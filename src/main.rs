mod cli;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, config::Config, init_tracing, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_json)?;

    match &cli.command {
        Commands::Convert(args) => {
            let config = Config::from_args(args)?;
            match command::convert(config).await {
                Ok(summary) => println!("Converted {}", summary),
                Err(e) => eprintln!("Error: {:#}", e),
            }
        }
        Commands::Inspect { archive, layout } => {
            match command::inspect(archive, layout.layout()) {
                Ok(members) => {
                    for (name, role) in members {
                        match role {
                            Some(role) => println!("{:<12} {}", role, name),
                            None => println!("{:<12} {}", "-", name),
                        }
                    }
                }
                Err(e) => eprintln!("Error: {:#}", e),
            }
        }
    }

    Ok(())
}
