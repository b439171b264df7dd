//! Entrypoint of the widgetd binary

use dotenvy::dotenv;

mod commands {
    pub(crate) mod consume;
}
mod logging;
mod object_store;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
name = "widgetd",
about = "Widget store reconciliation daemon",
long_about = r#"Widget store reconciliation daemon

Polls a source container for pending widget change events and applies each
event's intent (create, update, delete) to the configured sinks.

Examples:
    # Consume events from a local directory-backed store
    widgetd consume --object-store file --data-dir ~/.widgetd \
        --read-bucket requests --write-bucket web

    # Consume from S3 into both the mirror bucket and a table
    widgetd consume --read-bucket requests --write-bucket web --write-table widgets

    # Run with full debug logging
    LOG_FILTER=debug widgetd consume --object-store file --data-dir ~/.widgetd \
        --read-bucket requests --write-bucket web
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Consume pending widget change events and reconcile the sinks
    Consume(commands::consume::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Consume(config)) => {
                if let Err(e) = logging::init(&config.logging_config) {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
                if let Err(e) = commands::consume::command(config).await {
                    eprintln!("Consume command failed: {e:#}");
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
