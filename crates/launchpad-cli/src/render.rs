use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use launchpad_core::{HostVersion, InstalledPayload};
use launchpad_resolver::Selection;

pub(crate) const OUTPUT_STYLE_ENV: &str = "LAUNCHPAD_OUTPUT";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    output_style_from(
        std::env::var(OUTPUT_STYLE_ENV).ok().as_deref(),
        std::env::var_os("NO_COLOR").is_some(),
        std::io::stdout().is_terminal(),
    )
}

pub(crate) fn output_style_from(
    requested: Option<&str>,
    no_color: bool,
    is_terminal: bool,
) -> OutputStyle {
    match requested.map(str::trim) {
        Some("plain") => return OutputStyle::Plain,
        Some("rich") => return OutputStyle::Rich,
        _ => {}
    }
    if no_color || !is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", self.colorized_status(status, message));
    }

    pub(crate) fn eprint_status(self, status: &str, message: &str) {
        eprintln!("{}", self.colorized_status(status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    fn colorized_status(self, status: &str, message: &str) -> String {
        match self.style {
            OutputStyle::Plain => render_status_line(self.style, status, message),
            OutputStyle::Rich => format!(
                "{} {message}",
                colorize(badge_style(status), &status_badge(status))
            ),
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    let label = match status {
        "ok" => "OK",
        "warn" => "WARN",
        "err" => "ERR",
        _ => "..",
    };
    format!("[{label}]")
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

/// One line per installed payload; `*` marks the one the next launch uses.
pub(crate) fn format_install_lines(
    candidates: &[InstalledPayload],
    host: &HostVersion,
    resolved: Option<&Selection>,
) -> Vec<String> {
    let resolved_index = resolved.and_then(|selection| selection.index);
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let marker = if resolved_index == Some(index) { '*' } else { ' ' };
            format!(
                "{marker} [{index}] {} {} ({})",
                candidate.name,
                candidate.version.display_label(),
                candidate.entry_path(host).display()
            )
        })
        .collect()
}

pub(crate) fn format_selection_line(selection: &Selection) -> String {
    format!(
        "{} (source={})",
        selection.entry_path.display(),
        selection.source.as_str()
    )
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightCyan,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
