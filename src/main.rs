pub mod commands;
pub mod v1;
pub mod wallet;

use std::error::Error;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "powcoin", version, about = "A minimal proof-of-work cryptocurrency node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a validating, mining node (reads NAME and PEERS from the environment)
    Serve,
    /// Check that a node is alive
    Ping {
        #[arg(long, default_value = "node0")]
        node: String,
    },
    /// Print the balance of a named key
    Balance {
        name: String,
        #[arg(long, default_value = "node0")]
        node: String,
    },
    /// Send coins from one named key to another
    Tx {
        from: String,
        to: String,
        amount: u64,
        #[arg(long, default_value = "node0")]
        node: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    match Cli::parse().command {
        Commands::Serve => commands::serve(),
        Commands::Ping { node } => commands::ping(&node),
        Commands::Balance { name, node } => commands::balance(&name, &node),
        Commands::Tx {
            from,
            to,
            amount,
            node,
        } => commands::tx(&from, &to, amount, &node),
    }
}
