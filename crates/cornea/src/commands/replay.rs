//! `cornea replay` -- run a script and report what the views saw.

use tabled::Tabled;

use cornea_core::CoreConfig;

use crate::cli::{GlobalOpts, OutputFormat, ReplayArgs};
use crate::error::CliError;
use crate::output;
use crate::replay::{CachedModel, Replay, ReplayReport, Script, ViewRecord};

#[derive(Tabled)]
struct ViewRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&ViewRecord> for ViewRow {
    fn from(v: &ViewRecord) -> Self {
        Self {
            step: v.step,
            source: v.source.clone(),
            event: v.event.clone(),
            detail: if v.detail.is_null() {
                "-".into()
            } else {
                v.detail.to_string()
            },
        }
    }
}

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Type")]
    model_type: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&CachedModel> for CacheRow {
    fn from(m: &CachedModel) -> Self {
        Self {
            address: m.address.clone(),
            model_type: m.model_type.clone().unwrap_or_else(|| "-".into()),
            name: m.name.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub async fn handle(
    args: &ReplayArgs,
    mut config: CoreConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let path = args.script.display().to_string();
    let raw = tokio::fs::read_to_string(&args.script)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CliError::ScriptNotFound { path: path.clone() },
            _ => CliError::Io(e),
        })?;
    let script: Script = serde_json::from_str(&raw).map_err(|source| CliError::InvalidScript {
        path: path.clone(),
        source,
    })?;
    if script.steps.is_empty() {
        return Err(CliError::Validation {
            field: "steps".into(),
            reason: format!("{path} has no steps"),
        });
    }

    if let Some(ms) = args.debounce_ms {
        config.view_debounce = std::time::Duration::from_millis(ms);
    }

    let report = Replay::new(config, &script).run(&script.steps, !args.no_cache);
    let rendered = render(&report, &global.output, output::should_color(&global.color))?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn render(report: &ReplayReport, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    if let Some(out) = output::render_structured(format, report, plain)? {
        return Ok(out);
    }

    let views: Vec<ViewRow> = report.views.iter().map(ViewRow::from).collect();
    let mut sections = vec![
        output::heading(
            &format!(
                "Views ({} steps, {} requests)",
                report.steps, report.requests
            ),
            color,
        ),
        output::render_table(&views),
    ];
    if let Some(cache) = &report.cache {
        let rows: Vec<CacheRow> = cache.iter().map(CacheRow::from).collect();
        sections.push(String::new());
        sections.push(output::heading("Cache", color));
        sections.push(output::render_table(&rows));
    }
    Ok(sections.join("\n"))
}

fn plain(report: &ReplayReport) -> String {
    report
        .views
        .iter()
        .map(|v| format!("{}\t{}\t{}", v.step, v.source, v.event))
        .collect::<Vec<_>>()
        .join("\n")
}
