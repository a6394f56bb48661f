pub mod directive;
pub mod fabric;

pub use directive::{Directive, DirectivePolicy, ELIDED_DIRECTIVE_COMMENT};

use serde::Serialize;
use std::path::Path;

use crate::error::{DadError, Result};
use crate::types::{Cell, CellKind, LakehouseBinding, Notebook};

use fabric::SourceWriter;

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub policy: DirectivePolicy,
    pub lakehouse: Option<LakehouseBinding>,
}

/// Where one source cell landed in the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellBoundary {
    /// Index of the cell in the source notebook.
    pub cell: usize,
    /// Ordinal among emitted cells, starting at 0.
    pub ordinal: usize,
    pub kind: CellKind,
    /// 1-based line of the marker in the artifact.
    pub line: usize,
    pub marker: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content: String,
    pub boundaries: Vec<CellBoundary>,
    pub elided: Vec<Directive>,
    pub inline_directives: Vec<Directive>,
}

impl Artifact {
    /// Whether running this artifact needs the remote side to install
    /// packages inline.
    pub fn needs_inline_install(&self) -> bool {
        !self.inline_directives.is_empty()
    }
}

/// Turns notebooks into Fabric source artifacts.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn with_policy(policy: DirectivePolicy) -> Self {
        Self::new(ConvertOptions {
            policy,
            lakehouse: None,
        })
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(&self, notebook: &Notebook) -> Result<Artifact> {
        let mut writer = SourceWriter::new();
        writer.header(self.options.lakehouse.as_ref());

        let mut boundaries = Vec::new();
        let mut elided = Vec::new();
        let mut inline_directives = Vec::new();

        for (index, cell) in notebook.cells.iter().enumerate() {
            if cell.is_empty() {
                log::debug!("Skipping empty cell {}", index);
                continue;
            }

            let marker = match cell.kind {
                CellKind::Code if cell.is_parameters() => fabric::PARAMETERS_MARKER,
                CellKind::Code => fabric::CODE_MARKER,
                CellKind::Narrative => fabric::NARRATIVE_MARKER,
            };

            match cell.kind {
                CellKind::Code => {
                    let lines = self.resolve_directives(
                        index,
                        cell,
                        &mut elided,
                        &mut inline_directives,
                    )?;
                    boundaries.push(CellBoundary {
                        cell: index,
                        ordinal: boundaries.len(),
                        kind: cell.kind,
                        line: writer.next_line(),
                        marker,
                    });
                    write_code_cell(&mut writer, marker, &lines);
                }
                CellKind::Narrative => {
                    boundaries.push(CellBoundary {
                        cell: index,
                        ordinal: boundaries.len(),
                        kind: cell.kind,
                        line: writer.next_line(),
                        marker,
                    });
                    write_narrative_cell(&mut writer, cell);
                }
            }
        }

        Ok(Artifact {
            content: writer.finish(),
            boundaries,
            elided,
            inline_directives,
        })
    }

    /// Converts `source` and writes the artifact to `dest`.
    pub fn convert_file(&self, source: &Path, dest: &Path) -> Result<Artifact> {
        let notebook = Notebook::from_path(source)?;
        let artifact = self.convert(&notebook)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DadError::io(parent, e))?;
        }
        std::fs::write(dest, &artifact.content).map_err(|e| DadError::io(dest, e))?;

        log::info!(
            "Converted {} ({} cells) -> {}",
            source.display(),
            artifact.boundaries.len(),
            dest.display()
        );
        Ok(artifact)
    }

    fn resolve_directives(
        &self,
        index: usize,
        cell: &Cell,
        elided: &mut Vec<Directive>,
        inline: &mut Vec<Directive>,
    ) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(cell.content.len());
        let directives = directive::directive_lines(cell.content.as_slice());

        for (offset, line) in cell.content.iter().enumerate() {
            if !directives.contains(&offset) {
                lines.push(line.clone());
                continue;
            }

            let found = Directive {
                cell: index,
                line: offset + 1,
                text: line.trim().to_string(),
            };

            match self.options.policy {
                DirectivePolicy::Strict => {
                    return Err(DadError::UnsupportedDirective {
                        cell: found.cell,
                        line: found.line,
                        directive: found.text,
                    });
                }
                DirectivePolicy::Permissive => {
                    log::warn!(
                        "Eliding directive in cell {}, line {}: {}",
                        found.cell,
                        found.line,
                        found.text
                    );
                    lines.push(ELIDED_DIRECTIVE_COMMENT.to_string());
                    elided.push(found);
                }
                DirectivePolicy::Inline => {
                    lines.push(line.clone());
                    inline.push(found);
                }
            }
        }

        Ok(lines)
    }
}

fn write_code_cell(writer: &mut SourceWriter, marker: &str, lines: &[String]) {
    writer.line(marker);
    writer.blank();

    let language = lines
        .first()
        .and_then(|first| fabric::magic_language(first));

    let has_magic = lines.iter().any(|l| l.trim_start().starts_with('%'));
    if language.is_some() || has_magic {
        for line in lines {
            writer.line(fabric::magic(line));
        }
    } else {
        for line in lines {
            writer.line(fabric::escape_reserved(line));
        }
    }
    writer.blank();
    writer.cell_metadata(language.unwrap_or("python"));
}

fn write_narrative_cell(writer: &mut SourceWriter, cell: &Cell) {
    writer.line(fabric::NARRATIVE_MARKER);
    writer.blank();
    for line in &cell.content {
        writer.line(fabric::escape_reserved(&fabric::comment(line)));
    }
    writer.blank();
}
