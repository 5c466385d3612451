//! Terminal output for the command-line tool.
//!
//! Colors follow the usual conventions: off when `NO_COLOR` is set or stdout
//! is not a terminal.

use crate::record::MetadataRecord;
use std::io::{self, IsTerminal};

/// ANSI styles used by the console.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    /// Returns the ANSI escape code for this style.
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Width of the field-name column in record listings.
const FIELD_WIDTH: usize = 12;

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a console, detecting color support from `NO_COLOR` and the TTY.
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();
        Self { colors_enabled }
    }

    /// Creates a console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Wraps `text` in the given styles when colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// `[LABEL]` with the label colored.
    pub fn label(&self, label: &str, color: Style) -> String {
        format!("[{}]", self.style(label, &[color, Style::Bold]))
    }

    /// Prints an info message with a blue `[INFO]` label.
    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    /// Prints a success message with a green `[OK]` label.
    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    /// Prints a warning message with a yellow `[WARN]` label.
    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Prints an error message with a red `[ERROR]` label to stderr.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    /// Prints a step message with a cyan `[STEP]` label.
    pub fn step(&self, message: &str) {
        println!("{} {}", self.label("STEP", Style::Cyan), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Formats a count in green bold.
    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// One `name: value` line, name padded and colored.
    pub fn field(&self, name: &str, value: &str) -> String {
        let padded = format!("{:<width$}", format!("{name}:"), width = FIELD_WIDTH);
        format!("  {} {}", self.style(&padded, &[Style::Cyan]), value)
    }

    /// Lines describing a record. Empty fields are left out.
    pub fn record_lines(&self, record: &MetadataRecord) -> Vec<String> {
        let mut lines = vec![
            self.field("title", &record.title),
            self.field("authors", &record.authors.join(", ")),
        ];

        if let Some(series) = &record.series {
            let series = match record.series_index {
                Some(index) => format!("{series} [{index}]"),
                None => series.clone(),
            };
            lines.push(self.field("series", &series));
        }
        if let Some(pubdate) = record.pubdate {
            lines.push(self.field("published", &pubdate.format("%Y").to_string()));
        }
        if let Some(rating) = record.rating {
            lines.push(self.field("rating", &format!("{rating}/5")));
        }
        if !record.languages.is_empty() {
            lines.push(self.field("languages", &record.languages.join(", ")));
        }
        if !record.tags.is_empty() {
            let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
            lines.push(self.field("tags", &tags.join(", ")));
        }
        for (kind, id) in &record.identifiers {
            lines.push(self.field("identifier", &format!("{kind}:{id}")));
        }
        for url in &record.cover_urls {
            lines.push(self.field("cover", url));
        }
        if let Some(comments) = &record.comments {
            lines.push(self.field("comments", &self.muted(comments)));
        }
        lines.push(self.field("source", &self.muted(&record.source_url)));

        lines
    }

    /// Prints a numbered record block.
    pub fn record(&self, position: usize, record: &MetadataRecord) {
        self.section(&format!("#{position} {}", record.title));
        for line in self.record_lines(record) {
            println!("{line}");
        }
    }
}
