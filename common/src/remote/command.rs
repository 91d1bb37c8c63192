use std::borrow::Cow;
use std::fmt;

/// Quotes a value for a POSIX shell. Values made only of safe characters are
/// returned unchanged, everything else is wrapped in single quotes.
pub fn quote(value: &str) -> Cow<'_, str> {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,~".contains(c));
    if safe {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
}

/// A single shell command line assembled from escaped arguments.
///
/// Arguments added with [`ShellCommand::arg`] are quoted, fragments added
/// with [`ShellCommand::raw`] are trusted and emitted as-is (globs, `$HOME`,
/// supervisor placeholders).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    line: String,
}

impl ShellCommand {
    pub fn new(program: &str) -> Self {
        Self {
            line: program.to_string(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.line.push(' ');
        self.line.push_str(&quote(arg.as_ref()));
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    pub fn raw(mut self, fragment: impl AsRef<str>) -> Self {
        self.line.push(' ');
        self.line.push_str(fragment.as_ref());
        self
    }

    pub fn pipe(self, next: ShellCommand) -> Self {
        self.join("|", next)
    }

    pub fn and(self, next: ShellCommand) -> Self {
        self.join("&&", next)
    }

    pub fn redirect_to(self, path: &str) -> Self {
        self.raw(">").arg(path)
    }

    pub fn append_to(self, path: &str) -> Self {
        self.raw(">>").arg(path)
    }

    /// Makes a failing command succeed, so callers can inspect the output.
    pub fn or_true(self) -> Self {
        self.raw("|| true")
    }

    /// Feeds this line to a root (or `user`) shell: `echo '<line>' | sudo sh`.
    pub fn sudo_pipeline(&self, user: Option<&str>) -> ShellCommand {
        let sudo = match user {
            Some(user) => ShellCommand::new("sudo").arg("-u").arg(user).arg("sh"),
            None => ShellCommand::new("sudo").arg("sh"),
        };
        ShellCommand::new("echo").arg(&self.line).pipe(sudo)
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    fn join(mut self, op: &str, next: ShellCommand) -> Self {
        self.line.push(' ');
        self.line.push_str(op);
        self.line.push(' ');
        self.line.push_str(&next.line);
        self
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(quote("/usr/local/share/site"), "/usr/local/share/site");
        assert_eq!(quote("name==1.0"), "name==1.0");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn builds_pipelines() {
        let cmd = ShellCommand::new("pg_dump")
            .args(["-O", "-x", "site"])
            .pipe(ShellCommand::new("gzip"))
            .redirect_to("/tmp/site dump.sql.gz");
        assert_eq!(cmd.as_str(), "pg_dump -O -x site | gzip > '/tmp/site dump.sql.gz'");
    }

    #[test]
    fn sudo_pipeline_escapes_the_whole_line() {
        let inner = ShellCommand::new("echo")
            .arg("CREATE USER site WITH PASSWORD 'pw'")
            .pipe(ShellCommand::new("psql"));
        let cmd = inner.sudo_pipeline(Some("postgres"));
        assert_eq!(
            cmd.as_str(),
            r#"echo 'echo '\''CREATE USER site WITH PASSWORD '\''\'\'''\''pw'\''\'\'''\'''\'' | psql' | sudo -u postgres sh"#
        );
        assert_eq!(
            ShellCommand::new("whoami").sudo_pipeline(None).as_str(),
            "echo whoami | sudo sh"
        );
    }

    #[test]
    fn or_true_and_chains() {
        let cmd = ShellCommand::new("cd")
            .arg("/srv")
            .and(ShellCommand::new("service").args(["nginx", "status"]).or_true());
        assert_eq!(cmd.to_string(), "cd /srv && service nginx status || true");
    }
}
