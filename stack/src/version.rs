use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, StackError};

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.\d+)*").unwrap())
}

/// Finds the first dotted version number in a tool's `--version` output,
/// whatever label precedes it ("Python 2.7.3", "psql (PostgreSQL) 9.1.3").
pub fn parse_version(output: &str) -> Result<String> {
    version_re()
        .find(output)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| StackError::Version(output.trim().to_string()))
}

/// Major and minor components of the version found in `output`.
pub fn parse_short_version(output: &str) -> Result<String> {
    version_re()
        .captures(output)
        .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
        .ok_or_else(|| StackError::Version(output.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labelled_versions() {
        assert_eq!(parse_version("psql (PostgreSQL) 9.1.3\nextra").unwrap(), "9.1.3");
        assert_eq!(parse_short_version("psql (PostgreSQL) 9.1.3").unwrap(), "9.1");
        assert_eq!(parse_version("PostgreSQL 8.1.1").unwrap(), "8.1.1");
        assert_eq!(parse_short_version("PostgreSQL 8.1.1").unwrap(), "8.1");
        assert_eq!(parse_version("Python 2.7.3").unwrap(), "2.7.3");
        assert_eq!(parse_short_version("Python 3.12").unwrap(), "3.12");
    }

    #[test]
    fn rejects_output_without_version() {
        assert!(matches!(parse_version("command not found"), Err(StackError::Version(_))));
    }
}
