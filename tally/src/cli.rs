use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tally_config::{Config, OverridableConfig};

use crate::setup;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Aggregates statsd counters, gauges and timers and flushes them to Graphite.
#[derive(Debug, Parser)]
#[command(name = "tally", disable_version_flag = true, max_term_width = 79)]
struct Cli {
    /// The path to the config folder.
    #[arg(
        long,
        short,
        global = true,
        env = "TALLY_CONFIG",
        value_name = "CONFIG",
        default_value = ".tally"
    )]
    config: PathBuf,

    /// Print version information.
    #[arg(long, short = 'V')]
    version: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Values that take precedence over the config file.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// UDP address to receive samples on, such as `:8125`.
    #[arg(long, global = true, env = "TALLY_ADDRESS", value_name = "ADDR")]
    address: Option<String>,

    /// Address of the Graphite collector.
    #[arg(long, global = true, env = "TALLY_GRAPHITE", value_name = "ADDR")]
    graphite: Option<String>,

    /// Flush interval in seconds.
    #[arg(long, global = true, env = "TALLY_FLUSH_INTERVAL", value_name = "SECONDS")]
    flush_interval: Option<String>,

    /// Log every flushed stat and reset state even if the collector is unreachable.
    #[arg(
        long,
        global = true,
        env = "TALLY_DEBUG",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    debug: Option<String>,

    /// Number of flush intervals an idle counter keeps reporting zero.
    #[arg(long, global = true, env = "TALLY_PERSIST_COUNT_KEYS", value_name = "COUNT")]
    persist_count_keys: Option<String>,

    /// Percentile threshold for timers. May be given multiple times.
    #[arg(long = "percent-threshold", global = true, value_name = "PERCENT")]
    percent_thresholds: Vec<String>,

    /// The log level, one of `off`, `error`, `warn`, `info`, `debug` or `trace`.
    #[arg(long, global = true, env = "TALLY_LOG_LEVEL", value_name = "LEVEL")]
    log_level: Option<String>,
}

impl From<OverrideArgs> for OverridableConfig {
    fn from(args: OverrideArgs) -> Self {
        Self {
            address: args.address,
            graphite: args.graphite,
            flush_interval: args.flush_interval,
            debug: args.debug,
            persist_count_keys: args.persist_count_keys,
            percent_thresholds: args.percent_thresholds,
            log_level: args.log_level,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon in the foreground until it receives SIGTERM or SIGINT.
    ///
    /// This is also the default if no command is given.
    Run,

    /// Manage the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration, including overrides, as YAML.
    Show,
}

/// Parses the command line and runs the selected command.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        print_version();
        return Ok(());
    }

    let mut config = Config::from_path(&cli.config)?;
    config.apply_override(cli.overrides.into())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::Config(ConfigCommand::Show) => show_config(&config),
    }
}

#[allow(clippy::print_stdout)]
fn print_version() {
    println!("tally v{VERSION}");
}

#[allow(clippy::print_stdout)]
fn show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml_string()?);
    Ok(())
}

fn run(config: Config) -> Result<()> {
    tally_log::init(config.logging());
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    tally_server::run(config)?;
    Ok(())
}
