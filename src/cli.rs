use clap::Parser;

/// Offline caching proxy for progressive web apps.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", default_value = "./config.toml")]
    pub config: String,

    /// Only validate the config file and exit
    #[arg(long)]
    pub check: bool,
}
