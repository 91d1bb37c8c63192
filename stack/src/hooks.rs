//! Before/after callbacks around lifecycle phases.

use log::debug;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StackError};

/// A named lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Install,
    Update,
    UpdateCode,
    UpdateDependencies,
    BackupDatabase,
    ConfigureWebserver,
    RestartWebserver,
    StopWebserver,
    DbSnapshot,
    DbRestore,
    MediaSnapshot,
    MediaRestore,
    MediaSnapshotLocal,
    MediaRestoreLocal,
    RemoteSnapshot,
    RemoteRestore,
    EnableDebug,
    DisableDebug,
    RecreateDatabase,
    EnableNtpd,
    DisableNtpd,
    Backup,
    Restore,
    ListBackups,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::Update => "update",
            Phase::UpdateCode => "update_code",
            Phase::UpdateDependencies => "update_dependencies",
            Phase::BackupDatabase => "backup_database",
            Phase::ConfigureWebserver => "configure_webserver",
            Phase::RestartWebserver => "restart_webserver",
            Phase::StopWebserver => "stop_webserver",
            Phase::DbSnapshot => "db_snapshot",
            Phase::DbRestore => "db_restore",
            Phase::MediaSnapshot => "media_snapshot",
            Phase::MediaRestore => "media_restore",
            Phase::MediaSnapshotLocal => "media_snapshot_local",
            Phase::MediaRestoreLocal => "media_restore_local",
            Phase::RemoteSnapshot => "remote_snapshot",
            Phase::RemoteRestore => "remote_restore",
            Phase::EnableDebug => "enable_debug",
            Phase::DisableDebug => "disable_debug",
            Phase::RecreateDatabase => "recreate_database",
            Phase::EnableNtpd => "enable_ntpd",
            Phase::DisableNtpd => "disable_ntpd",
            Phase::Backup => "backup",
            Phase::Restore => "restore",
            Phase::ListBackups => "list_backups",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Before,
    After,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::Before => f.write_str("before"),
            HookEvent::After => f.write_str("after"),
        }
    }
}

/// What a handler is told about the event being fired.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub host: &'a str,
    pub phase: Phase,
    pub event: HookEvent,
}

pub type HookError = Box<dyn Error + Send + Sync>;

type Handler = Arc<dyn Fn(&HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync>;

/// Handlers registered per (event, phase), fired in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    handlers: Vec<(HookEvent, Phase, Handler)>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: HookEvent, phase: Phase, handler: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.handlers.push((event, phase, Arc::new(handler)));
        self
    }

    pub fn before<F>(&mut self, phase: Phase, handler: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.on(HookEvent::Before, phase, handler)
    }

    pub fn after<F>(&mut self, phase: Phase, handler: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.on(HookEvent::After, phase, handler)
    }

    /// Runs every matching handler; the first failure stops the rest.
    pub fn fire(&self, host: &str, event: HookEvent, phase: Phase) -> Result<()> {
        let context = HookContext { host, phase, event };
        for (_, _, handler) in self
            .handlers
            .iter()
            .filter(|(e, p, _)| *e == event && *p == phase)
        {
            debug!("[{}] {}_{} hook", host, event, phase);
            handler(&context).map_err(|err| StackError::Hook {
                event: format!("{}_{}", event, phase),
                reason: err.to_string(),
            })?;
        }
        Ok(())
    }
}
