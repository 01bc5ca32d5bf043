//! Settings resolution: `--config` / `HXDBG_CONFIG`, else built-in defaults.

use std::path::Path;

use anyhow::Context;

use hxdbg_core::config::Settings;

pub fn resolve(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => {
            let settings = Settings::load(path)
                .with_context(|| format!("invalid config {}", path.display()))?;
            tracing::debug!("loaded settings from {}", path.display());
            Ok(settings)
        }
        None => Ok(Settings::default()),
    }
}

/// `hxdbg check-config`: validate and print the effective settings.
pub fn cmd_check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let settings = resolve(path)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    match path {
        Some(path) => eprintln!("config ok: {}", path.display()),
        None => eprintln!("config ok: built-in defaults"),
    }
    Ok(())
}
