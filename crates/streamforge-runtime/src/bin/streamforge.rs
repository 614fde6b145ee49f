//! CLI front-end: parses the flags the core recognizes and reports the
//! resolved configuration. Building an actual pipeline's relationship
//! graph is an embedder's job (there is no pipeline description format
//! defined by the core); this binary is the flag/logging harness an
//! embedder's `main` links against.

use clap::Parser;
use streamforge_runtime::{Cli, Config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from(cli);

    let filter = if config.enable_asserts {
        "streamforge=debug"
    } else {
        "streamforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter)?)
        .init();

    tracing::info!(?config, "resolved configuration");
    if config.show_ir {
        tracing::info!("--show-ir requested: IR dumping is performed by the IrBuilder backend an embedder supplies");
    }
    if config.show_asm {
        tracing::info!("--show-asm requested: ASM dumping is performed by the codegen backend an embedder supplies");
    }

    Ok(())
}
