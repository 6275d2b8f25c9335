use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

const DEFAULT_CONFIG_FILE: &str = "medikiosk.jsonc";

/// `medikiosk [--config <path>]`, defaulting to `./medikiosk.jsonc`.
pub fn config_path_from_args() -> Result<PathBuf> {
    parse_config_path(env::args().skip(1))
}

fn parse_config_path(mut args: impl Iterator<Item = String>) -> Result<PathBuf> {
    let path = match args.next().as_deref() {
        None => return Ok(env::current_dir()?.join(DEFAULT_CONFIG_FILE)),
        Some("--config") => args.next().ok_or_else(|| {
            anyhow!("--config expects a path. Example: medikiosk --config ./medikiosk.jsonc")
        })?,
        Some(other) => {
            return Err(anyhow!(
                "unexpected argument '{other}'. Usage: medikiosk [--config <path>]"
            ));
        }
    };

    if let Some(extra) = args.next() {
        return Err(anyhow!(
            "unexpected argument '{extra}'. Usage: medikiosk [--config <path>]"
        ));
    }
    Ok(PathBuf::from(path))
}
