//! Config scaffolding

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use sitecheck_engine::EngineConfig;

use crate::output::print_success;

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the config file
    #[arg(default_value = "sitecheck.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }
    EngineConfig::default()
        .save(&args.path)
        .with_context(|| format!("writing {}", args.path.display()))?;
    print_success(&format!("Wrote default configuration to {}", args.path.display()));
    Ok(())
}
