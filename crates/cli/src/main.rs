use clap::Parser;
use provenant::Commands;

#[derive(Parser)]
#[command(name = "provenant")]
#[command(about = "Run cached, reproducible instructions", long_about = None)]
#[command(version)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, global = true)]
    silence: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    provenant_utils::logging::init(cli.silence).map_err(|e| eyre::eyre!("failed to initialize logging: {e}"))?;

    cli.command.execute()?;
    Ok(())
}
