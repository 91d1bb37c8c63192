use async_trait::async_trait;
use common::naming::timestamp_str;
use common::remote::{RemoteExecutor, Scope, ShellCommand};
use log::info;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::SourceControl;
use crate::error::Result;

fn submodule_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*path\s*=\s*(.*?)\s*$").unwrap())
}

/// Archives a local git checkout with `git archive`.
pub struct GitManager {
    root: PathBuf,
}

impl GitManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative paths of the submodules declared in `.gitmodules`.
    pub fn submodules(&self) -> Result<Vec<String>> {
        let gitmodules = self.root.join(".gitmodules");
        if !gitmodules.exists() {
            return Ok(Vec::new());
        }
        Ok(std::fs::read_to_string(gitmodules)?
            .lines()
            .filter_map(|line| submodule_path_re().captures(line))
            .map(|caps| caps[1].to_string())
            .collect())
    }
}

#[async_trait]
impl SourceControl for GitManager {
    async fn local_archive(
        &self,
        remote: &dyn RemoteExecutor,
        destination: &Path,
        include_submodules: bool,
    ) -> Result<BTreeMap<String, String>> {
        let mut dirs = vec![String::new()];
        if include_submodules {
            dirs.extend(self.submodules()?);
        }

        let prefix = format!("gitarchive_{}", timestamp_str());
        let mut archives = BTreeMap::new();
        for (index, dir) in dirs.into_iter().enumerate() {
            let file_name = format!("{}_{}.zip", prefix, index);
            let output = destination.join(&file_name);
            let module_root = self.root.join(&dir);
            info!("Archiving {} to {}", module_root.display(), output.display());

            let cmd = ShellCommand::new("git")
                .args(["archive", "HEAD", "--format", "zip", "--output"])
                .arg(output.to_string_lossy());
            Scope::new(remote)
                .cd(&module_root.to_string_lossy())
                .run_local(&cmd)
                .await?;
            archives.insert(dir, file_name);
        }
        Ok(archives)
    }
}
