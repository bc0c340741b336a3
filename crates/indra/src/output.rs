//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

/// Applies the status palette when color is on, passes text through
/// otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            enabled: should_color(mode),
        }
    }

    fn paint(self, text: &str, styled: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            styled(text)
        } else {
            text.to_owned()
        }
    }

    pub fn good(self, text: &str) -> String {
        self.paint(text, |t| t.green().to_string())
    }

    pub fn warn(self, text: &str) -> String {
        self.paint(text, |t| t.yellow().to_string())
    }

    pub fn bad(self, text: &str) -> String {
        self.paint(text, |t| t.red().bold().to_string())
    }

    pub fn dim(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed().to_string())
    }

    pub fn accent(self, text: &str) -> String {
        self.paint(text, |t| t.cyan().bold().to_string())
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item detail views don't use `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Key/value detail block, keys padded to a common width.
pub fn detail_block(rows: &[(&str, String)]) -> String {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{k:<width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

// ── Value formatting ─────────────────────────────────────────────────

/// A reading with its unit, or a dash when unknown.
pub fn reading(value: Option<f64>, unit: &str, decimals: usize) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.decimals$} {unit}"))
}

pub fn yes_no(value: Option<bool>) -> String {
    match value {
        Some(true) => "yes".into(),
        Some(false) => "no".into(),
        None => "-".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, Tabled)]
    struct Row {
        uid: String,
        name: String,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                uid: "a1".into(),
                name: "Driveway".into(),
            },
            Row {
                uid: "b2".into(),
                name: "Garage".into(),
            },
        ]
    }

    fn copy(r: &Row) -> Row {
        Row {
            uid: r.uid.clone(),
            name: r.name.clone(),
        }
    }

    #[test]
    fn plain_lists_identifiers() {
        let out = render_list(OutputFormat::Plain, &rows(), copy, |r| r.uid.clone()).unwrap();
        assert_eq!(out, "a1\nb2");
    }

    #[test]
    fn table_has_headers_and_values() {
        let out = render_list(OutputFormat::Table, &rows(), copy, |r| r.uid.clone()).unwrap();
        assert!(out.contains("uid") && out.contains("Garage"), "{out}");
    }

    #[test]
    fn structured_formats_serialize_the_data() {
        let out =
            render_list(OutputFormat::JsonCompact, &rows(), copy, |r| r.uid.clone()).unwrap();
        assert_eq!(
            out,
            r#"[{"uid":"a1","name":"Driveway"},{"uid":"b2","name":"Garage"}]"#
        );
        let out = render_list(OutputFormat::Yaml, &rows(), copy, |r| r.uid.clone()).unwrap();
        assert!(out.contains("name: Driveway"), "{out}");
    }

    #[test]
    fn readings_and_flags() {
        assert_eq!(reading(Some(7.24), "kW", 1), "7.2 kW");
        assert_eq!(reading(None, "kW", 1), "-");
        assert_eq!(yes_no(Some(true)), "yes");
        assert_eq!(yes_no(None), "-");
    }

    #[test]
    fn detail_block_aligns_keys() {
        let out = detail_block(&[("Mode", "IDLE".into()), ("Power", "0 kW".into())]);
        assert_eq!(out, "Mode   IDLE\nPower  0 kW");
    }

    #[test]
    fn painter_without_color_is_identity() {
        let p = Painter::new(ColorMode::Never);
        assert_eq!(p.bad("fault"), "fault");
        assert_eq!(p.good("ok"), "ok");
    }
}
