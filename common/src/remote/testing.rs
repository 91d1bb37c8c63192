//! In-memory [`RemoteExecutor`] that records every call.
//!
//! Responses are matched by substring against the composed command line; the
//! most recently registered matching rule wins, one-shot rules first. Uploaded
//! files are kept in memory and served back to `cat`.

use super::{quote, RemoteError, RemoteExecutor};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Run(String),
    Privileged { user: Option<String>, line: String },
    Local(String),
    Upload { local: PathBuf, remote: String, privileged: bool },
    Download { remote: String, local: PathBuf },
}

impl Recorded {
    fn render(&self) -> String {
        match self {
            Recorded::Run(line) => format!("run: {}", line),
            Recorded::Privileged { user: None, line } => format!("sudo: {}", line),
            Recorded::Privileged { user: Some(user), line } => format!("sudo[{}]: {}", user, line),
            Recorded::Local(line) => format!("local: {}", line),
            Recorded::Upload { remote, privileged: true, .. } => format!("put[sudo]: {}", remote),
            Recorded::Upload { remote, .. } => format!("put: {}", remote),
            Recorded::Download { remote, .. } => format!("get: {}", remote),
        }
    }
}

#[derive(Default)]
struct State {
    log: Vec<Recorded>,
    responses: Vec<(String, String)>,
    once: VecDeque<(String, String)>,
    failures: Vec<String>,
    files: HashMap<String, Vec<u8>>,
}

pub struct RecordingExecutor {
    host: String,
    state: Mutex<State>,
}

impl RecordingExecutor {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Answers every command containing `needle` with `output`.
    pub fn respond(&self, needle: &str, output: &str) -> &Self {
        self.lock().responses.push((needle.to_string(), output.to_string()));
        self
    }

    /// Answers the next command containing `needle` with `output`, once.
    pub fn respond_once(&self, needle: &str, output: &str) -> &Self {
        self.lock().once.push_back((needle.to_string(), output.to_string()));
        self
    }

    /// Makes every command containing `needle` exit with status 1.
    pub fn fail_on(&self, needle: &str) -> &Self {
        self.lock().failures.push(needle.to_string());
        self
    }

    pub fn put_file(&self, remote: &str, contents: &str) -> &Self {
        self.lock()
            .files
            .insert(remote.to_string(), contents.as_bytes().to_vec());
        self
    }

    pub fn file(&self, remote: &str) -> Option<String> {
        self.lock()
            .files
            .get(remote)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.lock().log.clone()
    }

    /// Every call rendered as `kind: line`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.iter().map(Recorded::render).collect()
    }

    /// Index of the first rendered call containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }

    pub fn clear(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer(&self, entry: Recorded, line: &str) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.log.push(entry);

        if state.failures.iter().any(|needle| line.contains(needle.as_str())) {
            return Err(RemoteError::CommandFailed {
                host: self.host.clone(),
                command: line.to_string(),
                status: 1,
                stderr: "simulated failure".to_string(),
            });
        }

        if let Some(index) = state.once.iter().position(|(needle, _)| line.contains(needle.as_str())) {
            if let Some((_, output)) = state.once.remove(index) {
                return Ok(output);
            }
        }

        if let Some((_, output)) = state
            .responses
            .iter()
            .rev()
            .find(|(needle, _)| line.contains(needle.as_str()))
        {
            return Ok(output.clone());
        }

        let served = state.files.iter().find_map(|(path, bytes)| {
            line.ends_with(&format!("cat {}", quote(path)))
                .then(|| String::from_utf8_lossy(bytes).into_owned())
        });
        Ok(served.unwrap_or_default())
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        self.answer(Recorded::Run(command.to_string()), command)
    }

    async fn run_privileged(
        &self,
        command: &str,
        as_user: Option<&str>,
    ) -> Result<String, RemoteError> {
        let entry = Recorded::Privileged {
            user: as_user.map(str::to_string),
            line: command.to_string(),
        };
        self.answer(entry, command)
    }

    async fn run_local(&self, command: &str) -> Result<String, RemoteError> {
        self.answer(Recorded::Local(command.to_string()), command)
    }

    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        privileged: bool,
    ) -> Result<(), RemoteError> {
        let contents = std::fs::read(local).unwrap_or_default();
        let mut state = self.lock();
        state.log.push(Recorded::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            privileged,
        });
        state.files.insert(remote.to_string(), contents);
        Ok(())
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let contents = {
            let mut state = self.lock();
            state.log.push(Recorded::Download {
                remote: remote.to_string(),
                local: local.to_path_buf(),
            });
            state.files.get(remote).cloned().unwrap_or_default()
        };
        std::fs::write(local, contents)?;
        Ok(())
    }
}
