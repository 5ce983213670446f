//! CLI argument parsing.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rosetta", version, about = "LLM wire-format translation service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "ROSETTA_CONFIG")]
    pub config: String,

    /// Listen host
    #[arg(long, env = "ROSETTA_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "ROSETTA_PORT")]
    pub port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info", env = "ROSETTA_LOG_LEVEL")]
    pub log_level: String,
}
