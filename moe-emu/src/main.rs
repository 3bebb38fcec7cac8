use std::path::PathBuf;

use clap::Parser;
use moe_core::ps2::Ps2;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moestation")]
#[command(about = "a PlayStation 2 emulator", long_about = None)]
struct Args {
    /// Path to the BIOS image (4 MiB).
    bios: PathBuf,

    /// Path to the disc image (.iso/.bin).
    disc: PathBuf,

    /// Boot in PlayStation mode.
    #[arg(long = "psx-mode", alias = "PSXMODE")]
    psx_mode: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.psx_mode {
        tracing::warn!("PSX mode is not implemented, booting in PS2 mode");
    }

    let mut ps2 = Ps2::new(&args.bios, Some(&args.disc))?;

    ps2.run()
}
