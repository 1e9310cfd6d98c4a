use clap::Subcommand;
use provenant_config::{Settings, SettingsLoader};
use provenant_core::Result;

pub mod cache;
pub mod init;
pub mod run;

use self::cache::CacheCommands;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an instruction, or fetch its cached record
    Run {
        /// Instruction name, `module`, `module@step` or `module::step`
        name: String,

        /// Parameter value, repeatable (`-p n=3 -p xc=PBE`)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Do not run dependencies whose outputs are missing
        #[arg(long)]
        skip_deps: bool,
    },

    /// Create the .provenant directory in the current directory
    Init,

    /// List instructions known to this binary
    List,

    /// Inspect and maintain the record cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

impl Commands {
    pub fn execute(self) -> Result<()> {
        match self {
            Commands::Run {
                name,
                params,
                skip_deps,
            } => run::execute(&load_settings()?, &name, &params, skip_deps),
            Commands::Init => init::execute(),
            Commands::List => run::list(),
            Commands::Cache(command) => command.execute(&load_settings()?),
        }
    }
}

fn load_settings() -> Result<Settings> {
    SettingsLoader::new().load()
}
