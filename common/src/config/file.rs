use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BountConfig {
    pub project: ProjectConfig,
    pub settings: SettingsConfig,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub name: String,
    pub local_root: String,
    pub source_root: String,
    pub settings_module: String,
    pub requirements: Option<String>,
    pub use_virtualenv: bool,
    pub remote_root: Option<String>,
    pub webserver: String,
    pub workers: u32,
    pub local_backup_dir: String,
    pub user: Option<String>,
    pub group: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<toml::Value>,
    #[serde(default)]
    pub os_dependencies: Vec<toml::Value>,
    #[serde(default)]
    pub precompilers: Vec<PrecompilerConfig>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrecompilerConfig {
    pub kind: String, // "less" or "coffee"
    pub from: String,
    pub to: String,
}

/// Application settings the deployment is derived from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    pub database: DatabaseConfig,
    pub media_root: String,
    pub media_url: String,
    pub static_root: String,
    pub static_url: String,
    #[serde(default)]
    pub admins: Vec<Vec<String>>,
    #[serde(default)]
    pub installed_apps: Vec<String>,
    pub logging_path: Option<String>,
}

impl SettingsConfig {
    pub fn has_app(&self, app: &str) -> bool {
        self.installed_apps.iter().any(|a| a == app)
    }

    /// Email of the first admin entry, if any.
    pub fn server_admin(&self) -> Option<&str> {
        self.admins
            .first()
            .and_then(|admin| admin.get(1).or_else(|| admin.first()))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub engine: String,
    pub name: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub address: String,
    pub port: Option<u16>,
    pub user: String,
    pub key_path: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    pub temp_dir: String,
    pub remote_dir: Option<String>,
    pub default: Option<String>,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Client {
        folder: String,
    },
    Server {
        folder: String,
    },
    S3 {
        bucket: String,
        prefix: Option<String>,
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    },
}

const CONFIG_PATHS: [&str; 3] = [
    "/etc/bount/bount.toml",
    "~/.config/bount/bount.toml",
    "bount.toml",
];

/// Loads the configuration from the well-known paths, an optional explicit
/// file, and `BOUNT__`-prefixed environment variables, in that order.
pub fn load_config(explicit: Option<&Path>) -> Result<BountConfig, ConfigError> {
    let config_builder = Config::builder()
        .set_default("project.local_root", ".")?
        .set_default("project.source_root", ".")?
        .set_default("project.settings_module", "settings")?
        .set_default("project.use_virtualenv", true)?
        .set_default("project.webserver", "nginx")?
        .set_default("project.workers", 1)?
        .set_default("project.local_backup_dir", "backup")?
        .set_default("settings.media_root", "media")?
        .set_default("settings.media_url", "/media/")?
        .set_default("settings.static_root", "static")?
        .set_default("settings.static_url", "/static/")?
        .set_default("backup.temp_dir", "/tmp")?;

    let config_builder = CONFIG_PATHS.iter().fold(config_builder, |builder, path| {
        let path = match shellexpand::full(path) {
            Ok(expanded) => expanded.into_owned(),
            Err(_) => return builder,
        };
        if Path::new(&path).exists() {
            builder.add_source(File::with_name(&path))
        } else {
            builder
        }
    });

    let config_builder = match explicit {
        Some(path) => config_builder.add_source(File::from(path)),
        None => config_builder,
    };

    config_builder
        .add_source(Environment::with_prefix("BOUNT").separator("__"))
        .build()?
        .try_deserialize()
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[project]
name = "getccna"
dependencies = ["south", ["pillow", "2.0"]]
precompilers = [{ kind = "less", from = "less", to = "compiled/css" }]
environment = { LANG = "en_US.UTF-8" }

[settings]
database = { engine = "django.db.backends.postgresql_psycopg2", name = "getccna", user = "getccna", password = "secret" }
admins = [["Admin", "admin@example.com"]]
installed_apps = ["django.contrib.auth", "south"]

[hosts.production]
address = "10.0.0.5"
user = "ubuntu"
key_path = "~/.ssh/id_rsa"

[backup]
default = "local"

[backup.destinations.local]
kind = "client"
folder = "backup/archives"

[backup.destinations.s3]
kind = "s3"
bucket = "backups"
"#;

    #[test]
    fn loads_explicit_file_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.project.name, "getccna");
        assert_eq!(config.project.webserver, "nginx");
        assert_eq!(config.project.workers, 1);
        assert!(config.project.use_virtualenv);
        assert_eq!(config.project.dependencies.len(), 2);
        assert_eq!(config.settings.media_url, "/media/");
        assert!(config.settings.has_app("south"));
        assert_eq!(config.settings.server_admin(), Some("admin@example.com"));
        assert_eq!(config.hosts["production"].user, "ubuntu");
        assert_eq!(config.backup.temp_dir, "/tmp");
        assert!(matches!(
            config.backup.destinations["local"],
            DestinationConfig::Client { ref folder } if folder == "backup/archives"
        ));
        assert!(matches!(config.backup.destinations["s3"], DestinationConfig::S3 { .. }));
    }

    #[test]
    fn server_admin_missing_when_no_admins() {
        let settings = SettingsConfig {
            database: DatabaseConfig {
                engine: "sqlite3".into(),
                name: "db.sqlite".into(),
                user: None,
                password: None,
                host: None,
            },
            media_root: "media".into(),
            media_url: "/media/".into(),
            static_root: "static".into(),
            static_url: "/static/".into(),
            admins: vec![],
            installed_apps: vec![],
            logging_path: None,
        };
        assert_eq!(settings.server_admin(), None);
    }
}
