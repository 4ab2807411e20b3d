//! Output formatting: table, JSON, YAML, plain.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Section heading for table output.
pub fn heading(title: &str, color: bool) -> String {
    if color {
        title.bold().cyan().to_string()
    } else {
        title.to_owned()
    }
}

/// Render structured data in a non-table format.
///
/// `plain` is only called for [`OutputFormat::Plain`]; tables are built
/// by the caller since they span several sections.
pub fn render_structured<T>(
    format: &OutputFormat,
    data: &T,
    plain: impl Fn(&T) -> String,
) -> Result<Option<String>, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Some(serde_json::to_string(data)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Some(plain(data)),
    })
}

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
