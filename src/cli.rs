/// CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use stackcheck::logging::LogFormat;
use stackcheck::utils::RuntimeKind;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser, Debug)]
#[command(name = "stackcheck")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to `verify`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Plan file (TOML or YAML); otherwise stackcheck.toml/.yaml, then the user config dir
    #[arg(short, long, global = true, env = "STACKCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// .env file with the deployment secrets
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// How container state is queried
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeKind>,

    /// Log output format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// More diagnostics (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full staged verification and persist the report
    Verify(VerifyArgs),

    /// One-off health snapshot of the HTTP services
    Health {
        /// Exit 1 when a required service is unhealthy
        #[arg(long)]
        strict: bool,

        /// Where to write the snapshot
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the .env file only
    Env,

    /// Show which expected containers are running
    Containers,

    /// Print the last persisted report
    Show {
        /// Report file to read
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print raw JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved plan without probing anything
    Plan,
}

#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Seconds to wait after containers are up (e.g. "10s", "0s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub warmup: Option<std::time::Duration>,

    /// Overall run deadline (e.g. "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deadline: Option<std::time::Duration>,

    /// Concurrent endpoint probes
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Report file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the report as JSON instead of the live console view
    #[arg(long)]
    pub json: bool,
}
