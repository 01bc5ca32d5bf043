//! hxdbg: htmx devtools relay runtime binary.
//! Hosts the relay coordinator behind a Unix socket, and provides the
//! panel (`watch`) and capture (`emit`) clients that talk to it.

use clap::Parser;

mod channel;
mod cli;
mod client;
mod cmd_emit;
mod cmd_watch;
mod relay_loop;
mod server;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("HXDBG_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
    let config_path = args.config.as_deref();

    match args.command {
        cli::Command::Relay => {
            let settings = settings::resolve(config_path)?;
            tracing::info!("hxdbg relay starting");
            relay_loop::run_relay(settings.relay, &socket_path).await?;
        }
        cli::Command::Watch(opts) => {
            let settings = settings::resolve(config_path)?;
            cmd_watch::cmd_watch(&socket_path, settings.panel, &opts).await?;
        }
        cli::Command::Emit(opts) => {
            let settings = settings::resolve(config_path)?;
            cmd_emit::cmd_emit(&socket_path, settings.capture, &opts).await?;
        }
        cli::Command::Probe => {
            client::cmd_probe(&socket_path).await?;
        }
        cli::Command::CheckConfig => {
            settings::cmd_check_config(config_path)?;
        }
    }

    Ok(())
}
