//! Config command implementations.

use std::path::PathBuf;

use crate::cli::ConfigCommands;
use crate::cli::commands::{display_path, load_config};
use crate::config::{BridgeConfig, Credential};
use crate::error::{Error, Result};

/// Execute config commands.
pub fn execute(command: &ConfigCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(config_path, json),
        ConfigCommands::Set {
            base_url,
            owner,
            project,
            login,
            timeout,
            page_size,
        } => {
            let (path, mut config) = load_config(config_path)?;
            if let Some(value) = base_url {
                config.base_url.clone_from(value);
            }
            if let Some(value) = owner {
                config.owner.clone_from(value);
            }
            if let Some(value) = project {
                config.project.clone_from(value);
            }
            if let Some(value) = login {
                config.default_login.clone_from(value);
            }
            if let Some(value) = timeout {
                config.timeout_secs = *value;
            }
            if let Some(value) = page_size {
                if *value == 0 {
                    return Err(Error::InvalidArgument(
                        "page-size must be at least 1".to_string(),
                    ));
                }
                config.page_size = *value;
            }
            config.save(&path)?;

            if json {
                let output = serde_json::json!({
                    "success": true,
                    "path": display_path(&path),
                    "config": masked(&config),
                });
                println!("{output}");
            } else {
                println!("Configuration saved to {}", display_path(&path));
            }
            Ok(())
        }
        ConfigCommands::AddToken {
            login,
            token,
            base_url,
        } => {
            if login.trim().is_empty() || token.trim().is_empty() {
                return Err(Error::InvalidArgument(
                    "login and token must not be empty".to_string(),
                ));
            }
            let (path, mut config) = load_config(config_path)?;
            config.set_credential(Credential {
                login: login.clone(),
                token: token.clone(),
                base_url: base_url.clone(),
            });
            config.save(&path)?;

            if json {
                let output = serde_json::json!({
                    "success": true,
                    "login": login,
                });
                println!("{output}");
            } else {
                println!("Token stored for {login}");
            }
            Ok(())
        }
    }
}

fn show(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (path, config) = load_config(config_path)?;

    if json {
        let output = serde_json::json!({
            "path": display_path(&path),
            "config": masked(&config),
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Config:    {}", display_path(&path));
    println!("Base URL:  {}", config.base_url);
    println!("Project:   {}/{}", config.owner, config.project);
    println!("Login:     {}", config.default_login);
    println!("Timeout:   {}s", config.timeout_secs);
    println!("Page size: {}", config.page_size);
    if config.credentials.is_empty() {
        println!("Tokens:    none");
    } else {
        println!("Tokens:");
        for credential in &config.credentials {
            match &credential.base_url {
                Some(url) => println!("  {} ({url})", credential.login),
                None => println!("  {}", credential.login),
            }
        }
    }
    Ok(())
}

/// Config as JSON with token values replaced.
fn masked(config: &BridgeConfig) -> serde_json::Value {
    let mut config = config.clone();
    for credential in &mut config.credentials {
        credential.token = "********".to_string();
    }
    serde_json::to_value(&config).unwrap_or(serde_json::Value::Null)
}
