//! Entrypoint of the auditflow binary

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

mod commands {
    pub(crate) mod drain;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "auditflow",
    about = "Drain an audit log API into date-partitioned append objects",
    long_about = r#"Drain an audit log API into date-partitioned append objects

Examples:
    # Drain into ./data using credentials from the environment
    AUDITFLOW_CREDENTIALS=user:pass auditflow drain --data-dir ./data

    # Pass filters through to the audit log API
    auditflow drain --data-dir ./data --param StartDate=2024-03-01 --param EndDate=2024-03-02

    # Run with full debug logging
    LOG_FILTER=debug auditflow drain --data-dir ./data
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Run one full drain of the audit log source
    Drain(commands::drain::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    init_logs();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Drain(config)) => {
                if let Err(e) = commands::drain::command(config).await {
                    eprintln!("Drain command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will
            // be applied when initialising the Config struct.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(1);
        }
    };
}

fn init_logs() {
    let filter = EnvFilter::try_from_env("LOG_FILTER").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
