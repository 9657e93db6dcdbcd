//! `tierpay init`: write a default node configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}

const DEFAULT_CONFIG: &str = r#"# Tierpay Node Configuration

[api]
listen_addr = "127.0.0.1"
port = 9100

[storage]
data_dir = "./data"

[logging]
level = "info"
format = "text"

[engine]
pending_timeout_secs = 1800
poll_interval_secs = 30
journal_enabled = true

[seed]
# path = "seed.toml"
"#;

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("tierpay.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    std::fs::create_dir_all(&args.dir)?;
    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Initialized Tierpay node at {}", config_path.display());
    println!("Point [seed].path at a directory seed to load channels, plans and nodes.");
    println!("Run 'tierpay-node --config {}' to start the node.", config_path.display());

    std::fs::create_dir_all(args.dir.join("data"))?;

    Ok(())
}
