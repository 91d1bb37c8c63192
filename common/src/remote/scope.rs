use super::{quote, RemoteError, RemoteExecutor, ShellCommand};
use log::debug;
use regex::Regex;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Privilege {
    User,
    Root,
    As(String),
}

/// Execution context for a group of remote calls.
///
/// Derived scopes are cheap values: `scope.cd(dir).sudo()` affects only the
/// calls made through the returned scope, and leaving the block ends the
/// directory change and the escalation whatever the exit path.
#[derive(Clone)]
pub struct Scope<'a> {
    remote: &'a dyn RemoteExecutor,
    cwd: Option<String>,
    prefixes: Vec<ShellCommand>,
    privilege: Privilege,
}

/// Ownership and mode applied by [`Scope::dir_ensure`].
#[derive(Debug, Clone, Default)]
pub struct DirOptions<'o> {
    pub recursive: bool,
    pub mode: Option<&'o str>,
    pub owner: Option<&'o str>,
    pub group: Option<&'o str>,
}

impl<'o> DirOptions<'o> {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: &'o str) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn owner(mut self, owner: &'o str) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn group(mut self, group: &'o str) -> Self {
        self.group = Some(group);
        self
    }
}

impl<'a> Scope<'a> {
    pub fn new(remote: &'a dyn RemoteExecutor) -> Self {
        Self {
            remote,
            cwd: None,
            prefixes: Vec::new(),
            privilege: Privilege::User,
        }
    }

    pub fn remote(&self) -> &'a dyn RemoteExecutor {
        self.remote
    }

    pub fn cd(&self, dir: &str) -> Self {
        let mut scope = self.clone();
        scope.cwd = Some(dir.to_string());
        scope
    }

    pub fn prefix(&self, prefix: ShellCommand) -> Self {
        let mut scope = self.clone();
        scope.prefixes.push(prefix);
        scope
    }

    pub fn sudo(&self) -> Self {
        let mut scope = self.clone();
        scope.privilege = Privilege::Root;
        scope
    }

    pub fn sudo_as(&self, user: &str) -> Self {
        let mut scope = self.clone();
        scope.privilege = Privilege::As(user.to_string());
        scope
    }

    pub fn is_privileged(&self) -> bool {
        self.privilege != Privilege::User
    }

    /// The command line as it will be sent, with directory and prefixes.
    pub fn compose(&self, command: &ShellCommand) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.prefixes.len() + 2);
        if let Some(cwd) = &self.cwd {
            parts.push(format!("cd {}", quote(cwd)));
        }
        parts.extend(self.prefixes.iter().map(|p| p.to_string()));
        parts.push(command.to_string());
        parts.join(" && ")
    }

    pub async fn run(&self, command: &ShellCommand) -> Result<String, RemoteError> {
        let line = self.compose(command);
        debug!("[{}] {}", self.remote.host(), line);
        match &self.privilege {
            Privilege::User => self.remote.run(&line).await,
            Privilege::Root => self.remote.run_privileged(&line, None).await,
            Privilege::As(user) => self.remote.run_privileged(&line, Some(user)).await,
        }
    }

    /// Runs on the local machine, honoring the scope's directory and prefixes.
    pub async fn run_local(&self, command: &ShellCommand) -> Result<String, RemoteError> {
        let line = self.compose(command);
        debug!("[local] {}", line);
        self.remote.run_local(&line).await
    }

    pub async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.run(&ShellCommand::new("cat").arg(path)).await
    }

    /// Writes `contents` through a local temporary file and an upload.
    pub async fn write_file(&self, path: &str, contents: &str) -> Result<(), RemoteError> {
        let mut local = tempfile::NamedTempFile::new()?;
        local.write_all(contents.as_bytes())?;
        local.flush()?;
        self.remote
            .upload_file(local.path(), path, self.is_privileged())
            .await
    }

    pub async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.remote
            .upload_file(local, remote, self.is_privileged())
            .await
    }

    pub async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        self.remote.download_file(remote, local).await
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.test("-f", path).await
    }

    pub async fn dir_exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.test("-d", path).await
    }

    async fn test(&self, flag: &str, path: &str) -> Result<bool, RemoteError> {
        let cmd = ShellCommand::new("test")
            .arg(flag)
            .arg(path)
            .and(ShellCommand::new("echo").arg("OK"))
            .or_true();
        Ok(self.run(&cmd).await?.trim_end().ends_with("OK"))
    }

    pub async fn dir_ensure(&self, path: &str, options: &DirOptions<'_>) -> Result<(), RemoteError> {
        self.run(&ShellCommand::new("mkdir").arg("-p").arg(path))
            .await?;
        self.dir_attribs(path, options).await
    }

    pub async fn dir_attribs(&self, path: &str, options: &DirOptions<'_>) -> Result<(), RemoteError> {
        let recursive = options.recursive.then_some("-R");
        if let Some(mode) = options.mode {
            self.run(&ShellCommand::new("chmod").args(recursive).arg(mode).arg(path))
                .await?;
        }
        let ownership = match (options.owner, options.group) {
            (Some(owner), Some(group)) => Some(format!("{}:{}", owner, group)),
            (Some(owner), None) => Some(owner.to_string()),
            (None, Some(group)) => Some(format!(":{}", group)),
            (None, None) => None,
        };
        if let Some(ownership) = ownership {
            self.run(&ShellCommand::new("chown").args(recursive).arg(ownership).arg(path))
                .await?;
        }
        Ok(())
    }

    pub async fn file_attribs(&self, path: &str, mode: &str) -> Result<(), RemoteError> {
        self.run(&ShellCommand::new("chmod").arg(mode).arg(path))
            .await
            .map(|_| ())
    }

    pub async fn file_delete(&self, path: &str) -> Result<(), RemoteError> {
        self.run(&ShellCommand::new("rm").arg("-f").arg(path))
            .await
            .map(|_| ())
    }

    pub async fn dir_delete(&self, path: &str) -> Result<(), RemoteError> {
        self.run(&ShellCommand::new("rm").arg("-rf").arg(path))
            .await
            .map(|_| ())
    }

    /// Removes every entry of `dir`, dot files included, keeping the directory.
    pub async fn clear_dir(&self, dir: &str) -> Result<(), RemoteError> {
        let base = dir.trim_end_matches('/');
        let base = quote(base);
        self.run(&ShellCommand::new("rm").arg("-rf").raw(format!("{}/*", base)))
            .await?;
        self.run(&ShellCommand::new("rm").arg("-rf").raw(format!("{}/.??*", base)))
            .await?;
        Ok(())
    }

    pub async fn list_dir(&self, dir: &str) -> Result<Vec<String>, RemoteError> {
        let output = self
            .run(&ShellCommand::new("ls").arg("-1").arg(dir))
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Entries of `dir` whose names match `pattern`, sorted.
    pub async fn ls_re(&self, dir: &str, pattern: &Regex) -> Result<Vec<String>, RemoteError> {
        let mut names: Vec<String> = self
            .list_dir(dir)
            .await?
            .into_iter()
            .filter(|name| pattern.is_match(name))
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn whoami(&self) -> Result<String, RemoteError> {
        Ok(self.run(&ShellCommand::new("whoami")).await?.trim().to_string())
    }

    pub async fn home(&self) -> Result<String, RemoteError> {
        Ok(self
            .run(&ShellCommand::new("echo").raw("$HOME"))
            .await?
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{Recorded, RecordingExecutor};

    #[tokio::test]
    async fn composes_directory_and_prefixes() {
        let remote = RecordingExecutor::new("web1");
        let scope = Scope::new(&remote)
            .cd("/srv/site")
            .prefix(ShellCommand::new("source").arg("/srv/site/env/bin/activate"));

        scope.run(&ShellCommand::new("pip").args(["install", "django"])).await.unwrap();

        assert_eq!(
            remote.commands(),
            vec!["run: cd /srv/site && source /srv/site/env/bin/activate && pip install django"]
        );
    }

    #[tokio::test]
    async fn escalation_ends_with_the_derived_scope() {
        let remote = RecordingExecutor::new("web1");
        let scope = Scope::new(&remote);
        {
            let root = scope.sudo();
            root.run(&ShellCommand::new("apt-get").arg("update")).await.unwrap();
            scope.sudo_as("postgres").run(&ShellCommand::new("psql")).await.unwrap();
        }
        scope.run(&ShellCommand::new("whoami")).await.unwrap();

        assert_eq!(
            remote.recorded(),
            vec![
                Recorded::Privileged { user: None, line: "apt-get update".into() },
                Recorded::Privileged { user: Some("postgres".into()), line: "psql".into() },
                Recorded::Run("whoami".into()),
            ]
        );
    }

    #[tokio::test]
    async fn dir_ensure_applies_attributes() {
        let remote = RecordingExecutor::new("web1");
        let scope = Scope::new(&remote).sudo();
        let options = DirOptions::recursive().mode("777").owner("www-data").group("www-data");
        scope.dir_ensure("/srv/site/media", &options).await.unwrap();

        assert_eq!(
            remote.commands(),
            vec![
                "sudo: mkdir -p /srv/site/media",
                "sudo: chmod -R 777 /srv/site/media",
                "sudo: chown -R www-data:www-data /srv/site/media",
            ]
        );
    }

    #[tokio::test]
    async fn ls_re_filters_and_sorts() {
        let remote = RecordingExecutor::new("web1");
        remote.respond("ls -1 /backups", "b.tar.gz\nnotes.txt\na.tar.gz\n");
        let re = Regex::new(r".*\.tar\.gz$").unwrap();
        let names = Scope::new(&remote).ls_re("/backups", &re).await.unwrap();
        assert_eq!(names, vec!["a.tar.gz", "b.tar.gz"]);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_uploads() {
        let remote = RecordingExecutor::new("web1");
        let scope = Scope::new(&remote).sudo();
        scope.write_file("/etc/app.conf", "key=value\n").await.unwrap();
        assert_eq!(scope.read_file("/etc/app.conf").await.unwrap(), "key=value\n");
        assert!(remote.commands().contains(&"put[sudo]: /etc/app.conf".to_string()));
    }

    #[tokio::test]
    async fn file_exists_reads_test_output() {
        let remote = RecordingExecutor::new("web1");
        remote.respond("test -f /home/u/lessc", "OK\n");
        let scope = Scope::new(&remote);
        assert!(scope.file_exists("/home/u/lessc").await.unwrap());
        assert!(!scope.file_exists("/home/u/coffee").await.unwrap());
    }
}
