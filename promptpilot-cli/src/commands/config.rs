//! Configuration management command implementations

use std::path::Path;

use crate::cli::ConfigCommands;
use crate::config::{ensure_default_file, get_config_path, PilotConfig};
use crate::error::CliError;

/// Handle configuration management operations
pub async fn handle_config_command(path: Option<&Path>, action: &ConfigCommands) -> Result<(), CliError> {
    match action {
        ConfigCommands::Show => show_config(path),
        ConfigCommands::Path => {
            let resolved = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
            println!("{}", resolved.display());
            Ok(())
        }
        ConfigCommands::Init => init_config(path),
    }
}

/// Print the effective configuration, with the token masked
fn show_config(path: Option<&Path>) -> Result<(), CliError> {
    let (mut config, loaded_from) = PilotConfig::load(path)?;
    if config.auth.token.is_some() {
        config.auth.token = Some("********".to_string());
    }
    let client = config.client_config()?;

    println!("# {}", loaded_from.display());
    print!("{}", toml::to_string_pretty(&config)?);
    println!("\n# effective stream endpoint: {}", client.ws_url);
    Ok(())
}

fn init_config(path: Option<&Path>) -> Result<(), CliError> {
    let target = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    if ensure_default_file(&target)? {
        println!("Created {}", target.display());
    } else {
        println!("{} already exists; left unchanged", target.display());
    }
    Ok(())
}
