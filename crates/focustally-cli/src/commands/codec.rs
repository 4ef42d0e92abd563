use clap::Subcommand;
use focustally_core::{codec, Config};

use super::open_engine;

#[derive(Subcommand)]
pub enum CodecAction {
    /// Mask a value
    Mask {
        value: String,
        /// Defaults to the shared seed
        #[arg(long)]
        seed: Option<String>,
    },
    /// Unmask a base64 value
    Unmask {
        masked: String,
        /// Defaults to the shared seed
        #[arg(long)]
        seed: Option<String>,
    },
    /// Show the shared seed, generating one if none is stored
    Seed {
        /// Replace the shared seed
        #[arg(long)]
        set: Option<String>,
    },
}

fn shared_seed(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    Ok(open_engine(config)?.ensure_seed()?)
}

pub fn run(action: CodecAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CodecAction::Mask { value, seed } => {
            let seed = match seed {
                Some(seed) => seed,
                None => shared_seed(config)?,
            };
            println!("{}", codec::mask(&value, &seed));
        }
        CodecAction::Unmask { masked, seed } => {
            let seed = match seed {
                Some(seed) => seed,
                None => shared_seed(config)?,
            };
            println!("{}", codec::unmask(&masked, &seed)?);
        }
        CodecAction::Seed { set } => {
            let engine = open_engine(config)?;
            if let Some(value) = set {
                engine.set_seed(&value)?;
            }
            println!("{}", engine.ensure_seed()?);
        }
    }
    Ok(())
}
