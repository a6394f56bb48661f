use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{DadError, Result};

pub const PARAMETERS_TAG: &str = "parameters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Code,
    Narrative,
}

impl CellKind {
    /// Maps an nbformat `cell_type` tag; `raw` cells are carried as narrative.
    pub fn from_cell_type(cell_type: &str) -> Option<Self> {
        match cell_type {
            "code" => Some(CellKind::Code),
            "markdown" | "raw" => Some(CellKind::Narrative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub kind: CellKind,
    pub content: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Cell {
    pub fn code(lines: &[&str]) -> Self {
        Self {
            kind: CellKind::Code,
            content: lines.iter().map(|l| l.to_string()).collect(),
            tags: Vec::new(),
        }
    }

    pub fn narrative(lines: &[&str]) -> Self {
        Self {
            kind: CellKind::Narrative,
            content: lines.iter().map(|l| l.to_string()).collect(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|line| line.trim().is_empty())
    }

    pub fn is_parameters(&self) -> bool {
        self.kind == CellKind::Code && self.tags.iter().any(|t| t == PARAMETERS_TAG)
    }
}

/// An ordered sequence of cells read from an nbformat document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
}

impl Notebook {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| DadError::io(path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw).map_err(|e| DadError::Parse {
            cell: None,
            reason: format!("not valid JSON: {}", e),
        })?;

        let cells = document
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| DadError::Parse {
                cell: None,
                reason: "expected a `cells` array".to_string(),
            })?;

        let cells = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| parse_cell(index, cell))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { cells })
    }
}

fn parse_cell(index: usize, cell: &Value) -> Result<Cell> {
    let fail = |reason: String| DadError::Parse {
        cell: Some(index),
        reason,
    };

    let cell_type = cell
        .get("cell_type")
        .and_then(Value::as_str)
        .ok_or_else(|| fail("missing `cell_type`".to_string()))?;

    let kind = CellKind::from_cell_type(cell_type)
        .ok_or_else(|| fail(format!("unrecognised cell_type `{}`", cell_type)))?;

    let source = match cell.get("source") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => {
            let mut joined = String::new();
            for part in parts {
                let part = part
                    .as_str()
                    .ok_or_else(|| fail("`source` entries must be strings".to_string()))?;
                joined.push_str(part);
            }
            joined
        }
        Some(_) => return Err(fail("`source` must be a string or list of strings".to_string())),
    };

    let tags = match cell.pointer("/metadata/tags") {
        Some(Value::Array(tags)) => tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Ok(Cell {
        kind,
        content: source.lines().map(str::to_string).collect(),
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_and_string_sources() {
        let raw = r##"{
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "intro"]},
                {"cell_type": "code", "metadata": {"tags": ["parameters"]}, "source": "x = 1\ny = 2"}
            ],
            "nbformat": 4
        }"##;

        let notebook = Notebook::from_json(raw).unwrap();
        assert_eq!(notebook.cells.len(), 2);
        assert_eq!(notebook.cells[0].kind, CellKind::Narrative);
        assert_eq!(notebook.cells[0].content, vec!["# Title", "intro"]);
        assert_eq!(notebook.cells[1].content, vec!["x = 1", "y = 2"]);
        assert!(notebook.cells[1].is_parameters());
    }

    #[test]
    fn test_raw_cells_are_narrative() {
        let raw = r#"{"cells": [{"cell_type": "raw", "source": ["plain"]}]}"#;
        let notebook = Notebook::from_json(raw).unwrap();
        assert_eq!(notebook.cells[0].kind, CellKind::Narrative);
    }

    #[test]
    fn test_unknown_cell_type_names_index() {
        let raw = r#"{"cells": [
            {"cell_type": "code", "source": []},
            {"cell_type": "widget", "source": []}
        ]}"#;

        match Notebook::from_json(raw) {
            Err(DadError::Parse { cell, .. }) => assert_eq!(cell, Some(1)),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_cell_type() {
        let raw = r#"{"cells": [{"source": ["x"]}]}"#;
        assert!(matches!(
            Notebook::from_json(raw),
            Err(DadError::Parse { cell: Some(0), .. })
        ));
    }

    #[test]
    fn test_missing_cells_array() {
        assert!(matches!(
            Notebook::from_json(r#"{"metadata": {}}"#),
            Err(DadError::Parse { cell: None, .. })
        ));
        assert!(matches!(
            Notebook::from_json("not json"),
            Err(DadError::Parse { cell: None, .. })
        ));
    }

    #[test]
    fn test_non_string_source_entry() {
        let raw = r#"{"cells": [{"cell_type": "code", "source": [1, 2]}]}"#;
        assert!(matches!(
            Notebook::from_json(raw),
            Err(DadError::Parse { cell: Some(0), .. })
        ));
    }

    #[test]
    fn test_empty_cell_detection() {
        assert!(Cell::code(&["", "   "]).is_empty());
        assert!(!Cell::narrative(&["text"]).is_empty());
    }
}
