//! Writer for Fabric's `notebook-content.py` source layout.

use std::borrow::Cow;

use crate::types::LakehouseBinding;

pub const SOURCE_HEADER: &str = "# Fabric notebook source";
pub const CODE_MARKER: &str = "# CELL ********************";
pub const PARAMETERS_MARKER: &str = "# PARAMETERS CELL ********************";
pub const NARRATIVE_MARKER: &str = "# MARKDOWN ********************";
pub const METADATA_MARKER: &str = "# METADATA ********************";
pub const MAGIC_PREFIX: &str = "# MAGIC ";
pub const KERNEL: &str = "synapse_pyspark";

/// Every line that opens a cell in the emitted source.
pub const BOUNDARY_MARKERS: [&str; 3] = [CODE_MARKER, PARAMETERS_MARKER, NARRATIVE_MARKER];

/// Accumulates output lines and tracks the current line number.
#[derive(Debug, Default)]
pub struct SourceWriter {
    lines: Vec<String>,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based number of the next line to be written.
    pub fn next_line(&self) -> usize {
        self.lines.len() + 1
    }

    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn header(&mut self, lakehouse: Option<&LakehouseBinding>) {
        self.line(SOURCE_HEADER);
        self.blank();
        self.line(METADATA_MARKER);
        self.blank();
        self.meta("{");
        self.meta("  \"kernel_info\": {");
        self.meta(format!("    \"name\": \"{}\"", KERNEL));
        match lakehouse {
            Some(binding) => {
                self.meta("  },");
                self.meta("  \"dependencies\": {");
                self.meta("    \"lakehouse\": {");
                self.meta(format!(
                    "      \"default_lakehouse\": \"{}\",",
                    binding.lakehouse_id
                ));
                self.meta(format!(
                    "      \"default_lakehouse_name\": \"{}\",",
                    binding.lakehouse_name
                ));
                self.meta(format!(
                    "      \"default_lakehouse_workspace_id\": \"{}\"",
                    binding.workspace_id
                ));
                self.meta("    }");
                self.meta("  }");
            }
            None => self.meta("  }"),
        }
        self.meta("}");
        self.blank();
    }

    pub fn cell_metadata(&mut self, language: &str) {
        self.line(METADATA_MARKER);
        self.blank();
        self.meta("{");
        self.meta(format!("  \"language\": \"{}\",", language));
        self.meta(format!("  \"language_group\": \"{}\"", KERNEL));
        self.meta("}");
        self.blank();
    }

    fn meta(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("# META {}", text.as_ref()));
    }

    /// Joins the buffer, trimming trailing blank space to one final newline.
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('\n');
        out
    }
}

/// Narrative lines become plain comments.
pub fn comment(line: &str) -> String {
    if line.is_empty() {
        "#".to_string()
    } else {
        format!("# {}", line)
    }
}

pub fn magic(line: &str) -> String {
    format!("{}{}", MAGIC_PREFIX, line).trim_end().to_string()
}

/// Cell language implied by the leading magic, if any.
pub fn magic_language(first_line: &str) -> Option<&'static str> {
    let first = first_line.trim_start();
    if first.starts_with("%%sql") {
        Some("sparksql")
    } else if first.starts_with('%') {
        Some("python")
    } else {
        None
    }
}

/// Whether Fabric would read `line` as structure rather than cell content.
pub fn is_reserved(line: &str) -> bool {
    let line = line.trim();
    line == SOURCE_HEADER
        || BOUNDARY_MARKERS.contains(&line)
        || line.starts_with("# META")
        || line.starts_with(MAGIC_PREFIX.trim_end())
}

/// Content lines that look like structure get one more `#`; they stay
/// comments either way.
pub fn escape_reserved(line: &str) -> Cow<'_, str> {
    if is_reserved(line) {
        Cow::Owned(format!("#{}", line))
    } else {
        Cow::Borrowed(line)
    }
}

/// Whether a compiled source still carries package installs as magics,
/// so its run needs inline installation enabled.
pub fn has_inline_directives(source: &str) -> bool {
    let mut cell: Vec<&str> = Vec::new();

    for line in source.lines().chain(std::iter::once(METADATA_MARKER)) {
        if let Some(rest) = line.strip_prefix(MAGIC_PREFIX) {
            cell.push(rest);
        } else if line == METADATA_MARKER || BOUNDARY_MARKERS.contains(&line) {
            if !super::directive::directive_lines(cell.as_slice()).is_empty() {
                return true;
            }
            cell.clear();
        }
    }
    false
}
