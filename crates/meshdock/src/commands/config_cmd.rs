//! Config subcommand handlers.

use std::io::Read;

use meshdock_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

/// Copy of `cfg` safe to print.
fn redacted(cfg: &Config) -> Config {
    Config {
        auth_key: cfg.auth_key.as_ref().map(|_| "****".into()),
        ..cfg.clone()
    }
}

fn render_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg)
        .map(|s| s.trim_end().to_owned())
        .map_err(|e| CliError::Render(e.to_string()))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = redacted(&util::load_config(global)?);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => render_toml(&cfg)?,
                ref format => output::render_single(format, &cfg, |_| String::new(), |_| {
                    String::new()
                })?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&util::config_file(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Init {
            control_url,
            auth_key_env,
            force,
        } => {
            let path = util::config_file(global);
            if path.exists() && !force {
                return Err(CliError::AlreadyExists {
                    what: "config file".into(),
                    path: path.display().to_string(),
                });
            }

            let cfg = Config {
                control_url,
                auth_key_env,
                ..Config::default()
            };
            cfg.validate()?;
            meshdock_config::save_config_to(&cfg, &path)?;
            tracing::info!(path = %path.display(), "config written");
            output::print_output(&format!("Wrote {}", path.display()), global.quiet);
            Ok(())
        }

        ConfigCommand::SetKey => {
            let mut secret = String::new();
            std::io::stdin().read_to_string(&mut secret)?;
            let secret = secret.trim();
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "auth key".into(),
                    reason: "nothing was read from stdin".into(),
                });
            }
            meshdock_config::store_auth_key(secret)?;
            output::print_output("Auth key stored in the system keyring", global.quiet);
            Ok(())
        }
    }
}
