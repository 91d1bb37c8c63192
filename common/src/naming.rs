//! Artifact naming.
//!
//! Every backup artifact is named `<tag>_<kind>_<timestamp>.<ext>` where the
//! timestamp is `YYYYMMDD_HHMMSSffffff`. The fields are zero-padded and
//! ordered from most to least significant, so lexical order is chronological.

use chrono::{Local, NaiveDateTime};
use regex::Regex;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%6f";

/// Current local time formatted for artifact names.
pub fn timestamp_str() -> String {
    format_timestamp(&Local::now().naive_local())
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn artifact_name(tag: &str, kind: &str, ext: &str) -> String {
    artifact_name_at(tag, kind, ext, &timestamp_str())
}

pub fn artifact_name_at(tag: &str, kind: &str, ext: &str, timestamp: &str) -> String {
    format!("{}_{}_{}.{}", tag, kind, timestamp, ext)
}

/// Regex matching exactly the artifacts produced by [`artifact_name`] for the
/// given tag, kind and extension.
pub fn artifact_pattern(tag: &str, kind: &str, ext: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^{}_{}_\d{{8}}_\d{{12}}\.{}$",
        regex::escape(tag),
        regex::escape(kind),
        regex::escape(ext)
    ))
}

/// Returns the newest name starting with `prefix` and ending with `suffix`.
pub fn latest<'a, I>(names: I, prefix: &str, suffix: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidates: Vec<&str> = names
        .into_iter()
        .filter(|name| name.starts_with(prefix) && name.ends_with(suffix))
        .collect();
    candidates.sort_unstable();
    candidates.last().map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, micro)
            .unwrap()
    }

    #[test]
    fn timestamp_has_fixed_width() {
        let ts = format_timestamp(&at(2013, 1, 2, 3, 4, 5, 7));
        assert_eq!(ts, "20130102_030405000007");
    }

    #[test]
    fn lexical_order_is_chronological() {
        let start = at(2012, 12, 31, 23, 59, 59, 999_990);
        let steps = [
            Duration::microseconds(1),
            Duration::microseconds(9),
            Duration::seconds(1),
            Duration::minutes(7),
            Duration::hours(11),
            Duration::days(40),
            Duration::days(400),
        ];

        let mut expected = Vec::new();
        let mut current = start;
        expected.push(artifact_name_at("site", "postgres", "sql.gz", &format_timestamp(&current)));
        for step in steps {
            current += step;
            expected.push(artifact_name_at("site", "postgres", "sql.gz", &format_timestamp(&current)));
        }

        let mut sorted = expected.clone();
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn latest_filters_by_prefix_and_suffix() {
        let names = [
            "site_db_20130101_000000000000.sql.gz",
            "site_db_20130301_000000000000.sql.gz",
            "site_media_20140101_000000000000.tar.gz",
            "other_db_20150101_000000000000.sql.gz",
            "site_db_20130201_000000000000.sql.gz",
        ];
        assert_eq!(
            latest(names, "site_db", ".sql.gz").as_deref(),
            Some("site_db_20130301_000000000000.sql.gz")
        );
        assert_eq!(latest(names, "none", ".sql.gz"), None);
    }

    #[test]
    fn pattern_matches_generated_names_only() {
        let re = artifact_pattern("my.site", "postgres", "sql.gz").unwrap();
        assert!(re.is_match(&artifact_name("my.site", "postgres", "sql.gz")));
        assert!(!re.is_match("myXsite_postgres_20130101_000000000000.sql.gz"));
        assert!(!re.is_match("my.site_postgres_20130101_000000000000.sql.gz.bak"));
        assert!(!re.is_match("my.site_postgres_2013_000000000000.sql.gz"));
    }
}
