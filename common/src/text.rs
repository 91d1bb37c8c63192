use regex::Regex;

/// Replaces every line that matches `pattern` (anchored at the line start)
/// with `replacement`. Returns the new text and the number of replaced lines.
///
/// Lines are split on `\n` and joined back with `\n`, so the trailing newline
/// state of the input is preserved.
pub fn replace_line_re(text: &str, pattern: &Regex, replacement: &str) -> (String, usize) {
    let mut replaced = 0;
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| match pattern.find(line) {
            Some(m) if m.start() == 0 => {
                replaced += 1;
                replacement
            }
            _ => line,
        })
        .collect();
    (lines.join("\n"), replaced)
}

/// Appends `line` unless the text already contains it as a full line.
pub fn ensure_line(text: &str, line: &str) -> String {
    if text.split('\n').any(|existing| existing == line) {
        return text.to_string();
    }
    if text.is_empty() || text.ends_with('\n') {
        format!("{}{}\n", text, line)
    } else {
        format!("{}\n{}\n", text, line)
    }
}

/// Normalizes line endings to `\n`.
pub fn unix_eol(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG_HBA: &str = "# comment\nlocal   all             postgres                                peer\nlocal   all             all                                     peer\nhost    all             all             127.0.0.1/32            md5\nhost    all             all             ::1/128                 md5\n";

    fn host_re() -> Regex {
        Regex::new(r"^host[\s\w\./]+$").unwrap()
    }

    fn local_re() -> Regex {
        Regex::new(r"^local\s+all\s+all.*$").unwrap()
    }

    #[test]
    fn replaces_matching_lines() {
        let (text, n) = replace_line_re(PG_HBA, &host_re(), "host\tall\tall\t0.0.0.0/0\tmd5");
        // `::1/128` contains a colon so only the IPv4 line matches
        assert_eq!(n, 1);
        let (text, n) = replace_line_re(&text, &local_re(), "local\tall\tall\t\tmd5");
        assert_eq!(n, 1);
        assert!(text.contains("host\tall\tall\t0.0.0.0/0\tmd5\n"));
        assert!(text.contains("local\tall\tall\t\tmd5\n"));
        assert!(text.contains("local   all             postgres"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let rewrite = |input: &str| {
            let (t, _) = replace_line_re(input, &host_re(), "host\tall\tall\t0.0.0.0/0\tmd5");
            let (t, _) = replace_line_re(&t, &local_re(), "local\tall\tall\t\tmd5");
            t
        };
        let once = rewrite(PG_HBA);
        assert_eq!(rewrite(&once), once);

        let listen = Regex::new(r".*listen_addresses\s*=").unwrap();
        let conf = "#listen_addresses = 'localhost'\t# what IP address(es) to listen on;\nport = 5432\n";
        let (first, n) = replace_line_re(conf, &listen, "listen_addresses = '*'\t");
        assert_eq!(n, 1);
        let (second, _) = replace_line_re(&first, &listen, "listen_addresses = '*'\t");
        assert_eq!(first, second);
        assert_eq!(first, "listen_addresses = '*'\t\nport = 5432\n");
    }

    #[test]
    fn match_must_start_at_line_start() {
        let re = Regex::new(r"DEBUG\s*=").unwrap();
        let (text, n) = replace_line_re("TEMPLATE_DEBUG = DEBUG\nDEBUG = False", &re, "DEBUG=True");
        assert_eq!(n, 1);
        assert_eq!(text, "TEMPLATE_DEBUG = DEBUG\nDEBUG=True");
    }

    #[test]
    fn ensure_line_appends_once() {
        let line = "export DJANGO_SETTINGS_MODULE=\"settings\"";
        let once = ensure_line("deactivate () {\n}", line);
        assert_eq!(once, format!("deactivate () {{\n}}\n{}\n", line));
        assert_eq!(ensure_line(&once, line), once);
    }

    #[test]
    fn unix_eol_normalizes() {
        assert_eq!(unix_eol("a\r\nb\rc\n"), "a\nb\nc\n");
    }
}
