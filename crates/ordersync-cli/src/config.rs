use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "ordersync")]
#[command(
    author,
    version,
    about = "Synchronizes Cafe24 orders into the order, inventory and customer tables"
)]
#[command(after_help = "Examples:
  ordersync sync
  ordersync sync --start-date 2025-01-01 --end-date 2025-01-07
  ordersync serve --bind 127.0.0.1:3000")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Cafe24 mall id (the subdomain of {mall_id}.cafe24api.com)
    #[arg(long, env = "CAFE24_MALL_ID")]
    pub cafe24_mall_id: String,

    /// OAuth access token for the Cafe24 Admin API
    #[arg(long, env = "CAFE24_ACCESS_TOKEN", hide_env_values = true)]
    pub cafe24_access_token: String,

    /// Cafe24 API version header value
    #[arg(long, env = "CAFE24_API_VERSION")]
    pub cafe24_api_version: Option<String>,

    /// Custom path to the config.toml tuning file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one order sync and print the summary as JSON
    #[command(after_help = "Dates are YYYY-MM-DD. Defaults: end = today, start = 7 days before end.")]
    Sync {
        /// First order date to include
        #[arg(long, value_name = "YYYY-MM-DD")]
        start_date: Option<String>,

        /// Last order date to include
        #[arg(long, value_name = "YYYY-MM-DD")]
        end_date: Option<String>,
    },
    /// Serve the HTTP sync trigger
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:3000", env = "ORDERSYNC_BIND")]
        bind: SocketAddr,
    },
}
