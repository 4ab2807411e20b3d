//! `cornea config` -- inspect configuration.

use cornea_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = cornea_config::config_path();
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let config = masked(cornea_config::load_config()?);
            let rendered = match output::render_structured(&global.output, &config, |c| {
                let mut names: Vec<&str> = c.profiles.keys().map(String::as_str).collect();
                names.sort_unstable();
                names.join("\n")
            })? {
                Some(out) => out,
                None => toml::to_string_pretty(&config)?,
            };
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}

/// Replace plaintext tokens so they never reach a terminal.
fn masked(mut config: Config) -> Config {
    for profile in config.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(MASK.into());
        }
    }
    config
}
