mod file;

pub use file::{
    expand_path, load_config, BackupConfig, BountConfig, DatabaseConfig, DestinationConfig,
    HostConfig, PrecompilerConfig, ProjectConfig, SettingsConfig,
};
