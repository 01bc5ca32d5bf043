//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hxdbg", about = "htmx lifecycle event relay and inspector")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/hxdbg/relay.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// TOML file overriding the built-in tunables
    #[arg(long, short = 'c', global = true, env = "HXDBG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the relay (UDS server + coordinator)
    Relay,
    /// Attach a panel to a tab and print its event log
    Watch(WatchOpts),
    /// Capture one synthetic htmx event and send it to the relay
    Emit(EmitOpts),
    /// Send a liveness probe to the relay and print the acknowledgement
    Probe,
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Tab id to subscribe to
    #[arg(long)]
    pub tab: u32,

    /// Event filter: all, request, response
    #[arg(long, default_value = "all")]
    pub filter: String,

    /// Case-insensitive text search over event content
    #[arg(long, default_value = "")]
    pub search: String,

    /// Show the full JSON of every event
    #[arg(long)]
    pub full: bool,

    /// Print each update as it arrives instead of redrawing the screen
    #[arg(long)]
    pub no_clear: bool,
}

#[derive(clap::Args)]
pub struct EmitOpts {
    /// Tab id the event originates from
    #[arg(long)]
    pub tab: u32,

    /// htmx event name, e.g. htmx:afterRequest
    #[arg(long, default_value = "htmx:load")]
    pub kind: String,

    /// id of the event's target element
    #[arg(long)]
    pub element_id: Option<String>,

    /// Tag name of the event's target element
    #[arg(long, default_value = "DIV")]
    pub tag: String,

    /// hx-* attribute on the target, as name=value (repeatable)
    #[arg(long = "attr")]
    pub attrs: Vec<String>,

    /// Attach a request to the event with this URL
    #[arg(long)]
    pub url: Option<String>,

    /// HTTP method of the attached request
    #[arg(long, default_value = "GET")]
    pub method: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/hxdbg/relay.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/hxdbg-{user}/relay.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_watch() {
        let cli = Cli::try_parse_from(["hxdbg", "watch", "--tab", "3", "--filter", "request"])
            .expect("parse");
        match cli.command {
            Command::Watch(opts) => {
                assert_eq!(opts.tab, 3);
                assert_eq!(opts.filter, "request");
                assert!(opts.search.is_empty());
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn parse_emit_with_attrs() {
        let cli = Cli::try_parse_from([
            "hxdbg",
            "-s",
            "/tmp/x.sock",
            "emit",
            "--tab",
            "1",
            "--kind",
            "htmx:afterRequest",
            "--attr",
            "hx-get=/items",
        ])
        .expect("parse");
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
        match cli.command {
            Command::Emit(opts) => {
                assert_eq!(opts.kind, "htmx:afterRequest");
                assert_eq!(opts.attrs, vec!["hx-get=/items"]);
                assert_eq!(opts.tag, "DIV");
            }
            _ => panic!("expected emit"),
        }
    }

    #[test]
    fn socket_path_ends_with_relay_sock() {
        assert!(default_socket_path().ends_with("/relay.sock"));
    }
}
