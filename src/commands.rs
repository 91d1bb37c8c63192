use clap::Subcommand;
use log::info;
use stack::{Lifecycle, Result};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Provision the host and deploy the project from scratch
    Install {
        /// Assume OS packages, runtime packages and precompilers are installed
        #[clap(long)]
        skip_packages: bool,
    },

    /// Back up the database, upload code, migrate, collect static files and restart
    Update,

    /// Upload code and restart
    UpdateCode,

    /// Install runtime dependencies only
    UpdateDeps,

    /// Restart the web server and application services
    Restart,

    /// Dump the database on the host
    BackupDb,

    /// Download a fresh database dump
    DbSnapshot,

    /// Load the latest downloaded database dump into the host database
    DbRestore,

    /// Download an archive of the media folder
    MediaSnapshot,

    /// Restore the latest media archive on the host
    MediaRestore,

    /// Archive the local media folder
    MediaSnapshotLocal,

    /// Replace the local media folder with the latest media archive
    MediaRestoreLocal,

    /// Download media and a database dump
    RemoteSnapshot,

    /// Update the host, then restore the latest media and database dumps
    RemoteRestore,

    /// Set DEBUG = True and restart
    EnableDebug,

    /// Set DEBUG = False and restart
    DisableDebug,

    /// Drop and recreate the database
    RecreateDb,

    /// Start ntpd
    EnableNtpd,

    /// Stop ntpd
    DisableNtpd,

    /// Archive database and media into a backup destination
    Backup {
        #[clap(long)]
        destination: Option<String>,
    },

    /// Restore database and media from a stored backup
    Restore {
        /// Archive name as printed by list-backups
        name: String,
        #[clap(long)]
        destination: Option<String>,
    },

    /// List stored backups
    ListBackups {
        #[clap(long)]
        destination: Option<String>,
    },

    /// List configured backup destinations
    ListDestinations,
}

impl Command {
    pub async fn run(&self, lifecycle: &Lifecycle) -> Result<()> {
        match self {
            Command::Install { skip_packages } => lifecycle.install(*skip_packages).await,
            Command::Update => lifecycle.update().await,
            Command::UpdateCode => lifecycle.update_code().await,
            Command::UpdateDeps => lifecycle.update_dependencies().await,
            Command::Restart => lifecycle.restart().await,
            Command::BackupDb => {
                let path = lifecycle.backup_database().await?;
                info!("Database dumped to {}", path);
                Ok(())
            }
            Command::DbSnapshot => {
                let path = lifecycle.db_snapshot().await?;
                info!("Database dump saved to {}", path.display());
                Ok(())
            }
            Command::DbRestore => lifecycle.db_restore().await,
            Command::MediaSnapshot => {
                let path = lifecycle.media_snapshot().await?;
                info!("Media archive saved to {}", path.display());
                Ok(())
            }
            Command::MediaRestore => lifecycle.media_restore().await,
            Command::MediaSnapshotLocal => {
                let path = lifecycle.media_snapshot_local().await?;
                info!("Local media archived to {}", path.display());
                Ok(())
            }
            Command::MediaRestoreLocal => lifecycle.media_restore_local().await,
            Command::RemoteSnapshot => lifecycle.remote_snapshot().await,
            Command::RemoteRestore => lifecycle.remote_restore().await,
            Command::EnableDebug => lifecycle.enable_debug().await,
            Command::DisableDebug => lifecycle.disable_debug().await,
            Command::RecreateDb => lifecycle.recreate_database().await,
            Command::EnableNtpd => lifecycle.enable_ntpd().await,
            Command::DisableNtpd => lifecycle.disable_ntpd().await,
            Command::Backup { destination } => {
                let name = lifecycle.backup(destination.as_deref()).await?;
                println!("{}", name);
                Ok(())
            }
            Command::Restore { name, destination } => {
                lifecycle.restore(name, destination.as_deref()).await
            }
            Command::ListBackups { destination } => {
                for name in lifecycle.list_backups(destination.as_deref()).await? {
                    println!("{}", name);
                }
                Ok(())
            }
            Command::ListDestinations => {
                for line in lifecycle.list_destinations() {
                    println!("{}", line);
                }
                Ok(())
            }
        }
    }
}
