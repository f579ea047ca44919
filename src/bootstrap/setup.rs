//! Process start-up: logging.

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, WriteStyle};
use log::kv::Key;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

const DURATION_WIDTH: usize = 10;

/// `12.345678ms` -> `12.35 ms`. Anything else is returned unchanged.
pub fn format_duration(raw: &str) -> String {
    if let Some(idx) = raw.find(|c: char| c.is_alphabetic()) {
        let (num, unit) = (&raw[..idx], &raw[idx..]);
        if let Ok(val) = num.parse::<f32>() {
            return format!("{:.2} {}", val, unit);
        }
    }
    raw.to_string()
}

/// Install the global logger. With `log_file` set, lines are appended to
/// that file instead of stderr.
pub fn initialize_logger(log_file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::new();
    builder.format(|buf, record| {
        let dim = Style::new().fg_color(Some(AnsiColor::BrightBlack.into()));
        let cyan = Style::new().fg_color(Some(AnsiColor::Cyan.into()));
        let level_style = buf.default_level_style(record.level());

        let dur_raw = record
            .key_values()
            .get(Key::from("duration"))
            .map(|v| format_duration(&v.to_string()))
            .unwrap_or_default();
        let dur = if dur_raw.is_empty() {
            " ".repeat(DURATION_WIDTH)
        } else {
            format!("{cyan}{:>width$}{cyan:#}", dur_raw, width = DURATION_WIDTH)
        };

        writeln!(
            buf,
            "{dim}{}{dim:#} {level_style}{}{level_style:#} {dim}{}{dim:#}",
            buf.timestamp(),
            record.level(),
            record.target()
        )?;

        let message = record.args().to_string();
        let subsequent_indent = " ".repeat(DURATION_WIDTH + 1);
        let mut lines = message.lines();
        if let Some(first_line) = lines.next() {
            writeln!(buf, "{} {}", dur, first_line)?;
        }
        for line in lines {
            writeln!(buf, "{}{}", subsequent_indent, line)?;
        }
        Ok(())
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {:?}", path))?;
        builder
            .write_style(WriteStyle::Never)
            .target(env_logger::Target::Pipe(Box::new(file)));
    } else {
        builder.write_style(WriteStyle::Auto);
    }

    builder
        // INFO+ globally, WARN+ for Rocket
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .context("logger already initialized")?;
    Ok(())
}
