mod commands;
mod config;
mod error;
mod looker_http;
mod output;

use clap::Parser;
use observability_deps::{init_logging, LogFormat};

use error::Error;

#[derive(Debug, clap::Parser)]
#[clap(
    name = "lookervault",
    about = "Operational backup/restore and bulk-edit tool for Looker BI content",
    long_about = "Extracts Looker content into a local SQLite repository, restores it to \
    the same or a different instance, and round-trips it through a YAML directory tree for \
    bulk editing.\n\nConfiguration is read from command line flags or the matching \
    environment variable; there is no TOML config file."
)]
struct Cli {
    /// Emit newline-delimited JSON logs instead of human-readable text.
    #[clap(long)]
    json_logs: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Extract content from a Looker instance into the local repository.
    Extract(commands::extract::Config),
    /// Restore content from the repository to a Looker instance.
    Restore(commands::restore::Config),
    /// Render the repository into an editable directory tree.
    Unpack(commands::unpack::Config),
    /// Write an edited directory tree back into the repository.
    Pack(commands::pack::Config),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Full };
    init_logging("info", format);

    let json = match &cli.command {
        Command::Extract(c) => c.output.json,
        Command::Restore(c) => c.wants_json(),
        Command::Unpack(c) => c.output.json,
        Command::Pack(c) => c.output.json,
    };

    let result = run(cli.command).await;
    let exit_code = match &result {
        Ok(()) => 0,
        Err(e) => {
            if !json {
                eprintln!("error: {e}");
            }
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::Extract(config) => {
            let json = config.output.json;
            let summary = commands::extract::command(config).await?;
            output::emit(&summary, json);
            Ok(())
        }
        Command::Restore(config) => {
            let json = config.wants_json();
            let summary = commands::restore::command(config).await?;
            output::emit(&summary, json);
            Ok(())
        }
        Command::Unpack(config) => {
            let json = config.output.json;
            let summary = commands::unpack::command(config).await?;
            output::emit(&summary, json);
            Ok(())
        }
        Command::Pack(config) => {
            let json = config.output.json;
            let summary = commands::pack::command(config).await?;
            output::emit(&summary, json);
            Ok(())
        }
    }
}
