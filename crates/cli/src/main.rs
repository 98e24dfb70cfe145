use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::Settings;

/// Book catalogue service
#[derive(Debug, Parser)]
#[command(name = "libris", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server until interrupted (default)
    Serve,
    /// Print the effective settings as JSON and exit
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load libris settings")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Config => {
            let rendered =
                serde_json::to_string_pretty(&settings).context("failed to render settings")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Serve => {
            libris_telemetry::init(&settings.telemetry)?;
            tracing::info!(env = ?settings.environment, "libris CLI serving");

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?
                .block_on(libris_app::run(settings))
        }
    }
}
