use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::DadError;

/// Line written in place of an elided directive.
pub const ELIDED_DIRECTIVE_COMMENT: &str =
    "# package installation removed: the remote environment manages its own packages";

static MAGIC_INSTALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(%%?|!)\s*(pip3?|conda|mamba|micromamba)\b").unwrap()
});

static SHELL_PIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*!.*\bpip3?\s+install\b").unwrap());

static SHELL_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*%%(sh|bash|script|system)\b").unwrap());

static SHELL_INSTALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s;&|(])(pip3?|conda|mamba|micromamba)\s+install\b").unwrap()
});

/// What the converter does with package-installation lines in code cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectivePolicy {
    /// Reject the notebook.
    Strict,
    /// Replace the line with a neutral comment.
    Permissive,
    /// Keep the line as a Fabric magic and let the remote side install inline.
    #[default]
    Inline,
}

impl DirectivePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectivePolicy::Strict => "strict",
            DirectivePolicy::Permissive => "permissive",
            DirectivePolicy::Inline => "inline",
        }
    }
}

impl FromStr for DirectivePolicy {
    type Err = DadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(DirectivePolicy::Strict),
            "permissive" => Ok(DirectivePolicy::Permissive),
            "inline" => Ok(DirectivePolicy::Inline),
            other => Err(DadError::Config(format!(
                "unknown directive policy `{}` (expected strict, permissive or inline)",
                other
            ))),
        }
    }
}

/// A directive found while converting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub cell: usize,
    /// 1-based line within the cell.
    pub line: usize,
    pub text: String,
}

pub fn is_directive(line: &str) -> bool {
    MAGIC_INSTALL.is_match(line) || SHELL_PIP.is_match(line)
}

/// Zero-based indices of the directive lines in one code cell. In a shell
/// cell (`%%sh`, `%%bash`, `%%script`, `%%system`) plain installer commands
/// count as well.
pub fn directive_lines<S: AsRef<str>>(lines: &[S]) -> Vec<usize> {
    let shell = lines
        .first()
        .is_some_and(|first| SHELL_CELL.is_match(first.as_ref()));

    lines
        .iter()
        .enumerate()
        .filter(|(index, line)| {
            let line = line.as_ref();
            is_directive(line) || (shell && *index > 0 && SHELL_INSTALL.is_match(line))
        })
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_magic_installs() {
        assert!(is_directive("%pip install pandas"));
        assert!(is_directive("  %conda install -y numpy"));
        assert!(is_directive("!pip install semantic-link"));
        assert!(is_directive("%%pip"));
        assert!(is_directive("!pip3 install x"));
        assert!(is_directive("!mamba install polars"));
    }

    #[test]
    fn test_detects_shell_pip_through_interpreter() {
        assert!(is_directive("!{sys.executable} -m pip install requests"));
        assert!(is_directive("!python -m pip install requests"));
    }

    #[test]
    fn test_ignores_ordinary_code() {
        assert!(!is_directive("import pip"));
        assert!(!is_directive("pipeline = build()"));
        assert!(!is_directive("%%sql"));
        assert!(!is_directive("!ls -la"));
        assert!(!is_directive("# %pip install commented out"));
    }

    #[test]
    fn test_shell_cell_installs() {
        assert_eq!(directive_lines(&["%%sh", "pip install pandas"]), vec![1]);
        assert_eq!(
            directive_lines(&["%%bash", "cd /tmp", "python -m pip install -r req.txt"]),
            vec![2]
        );
        assert_eq!(directive_lines(&["%%script bash", "conda install -y numpy"]), vec![1]);
        assert_eq!(directive_lines(&["%%capture", "%pip install semantic-link"]), vec![1]);
    }

    #[test]
    fn test_installer_words_outside_shell_cells() {
        assert!(directive_lines(&["cmd = \"pip install pandas\""]).is_empty());
        assert!(directive_lines(&["%%sh", "ls -la", "echo done"]).is_empty());
        assert!(directive_lines(&["%%sql", "SELECT 'pip install'"]).is_empty());
    }

    #[test]
    fn test_default_policy_is_inline() {
        assert_eq!(DirectivePolicy::default(), DirectivePolicy::Inline);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("STRICT".parse::<DirectivePolicy>().unwrap(), DirectivePolicy::Strict);
        assert_eq!("inline".parse::<DirectivePolicy>().unwrap(), DirectivePolicy::Inline);
        assert!("lenient".parse::<DirectivePolicy>().is_err());
    }

    #[test]
    fn test_elided_comment_is_not_a_directive() {
        assert!(!is_directive(ELIDED_DIRECTIVE_COMMENT));
    }
}
