use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use common::text::{replace_line_re, unix_eol};
use log::{info, warn};
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use stack::managers::{CreateStatus, DatabaseManager};
use stack::version::{parse_short_version, parse_version};
use stack::{Result, StackError};
use tokio::sync::OnceCell;

use crate::wrapper::{PgDump, PgDumpOptions, Psql, PsqlOptions};

const DEFAULT_BACKUP_FOLDER: &str = "/tmp";
const PGPASS: &str = "~/.pgpass";

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn validate_identifier(field: &str, value: &str) -> Result<String> {
    if identifier_re().is_match(value) {
        Ok(value.to_string())
    } else {
        Err(StackError::invalid(field, value))
    }
}

/// `pg_hba.conf` with password logins allowed from anywhere.
pub fn open_pg_hba(text: &str) -> Result<String> {
    let (text, _) = replace_line_re(
        text,
        &Regex::new(r"^host[\s\w\./]+$")?,
        "host\tall\tall\t0.0.0.0/0\tmd5",
    );
    let (text, _) = replace_line_re(
        &text,
        &Regex::new(r"^local\s+all\s+all.*$")?,
        "local\tall\tall\t\tmd5",
    );
    Ok(text)
}

/// `postgresql.conf` listening on every interface.
pub fn listen_everywhere(text: &str) -> Result<String> {
    let (text, _) = replace_line_re(
        text,
        &Regex::new(r".*listen_addresses\s*=")?,
        "listen_addresses = '*'\t",
    );
    Ok(text)
}

/// A PostgreSQL database on the target host, administered through the
/// `postgres` superuser account.
pub struct PostgresManager {
    database_name: String,
    user: String,
    password: String,
    superuser_login: String,
    backup_folder: String,
    version: OnceCell<String>,
}

impl PostgresManager {
    /// Database and user names end up inside SQL statements, so anything
    /// but a plain identifier is rejected.
    pub fn new(database_name: &str, user: &str, password: &str) -> Result<Self> {
        Ok(Self {
            database_name: validate_identifier("database name", database_name)?,
            user: validate_identifier("database user", user)?,
            password: password.to_string(),
            superuser_login: "postgres".to_string(),
            backup_folder: DEFAULT_BACKUP_FOLDER.to_string(),
            version: OnceCell::new(),
        })
    }

    pub fn with_superuser(mut self, login: &str) -> Self {
        self.superuser_login = login.to_string();
        self
    }

    /// Folder used by `backup_database` when the caller names none.
    pub fn with_backup_folder(mut self, folder: &str) -> Self {
        self.backup_folder = folder.trim_end_matches('/').to_string();
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    fn superuser<'a>(&self, remote: &'a dyn RemoteExecutor) -> Scope<'a> {
        Scope::new(remote).sudo_as(&self.superuser_login)
    }

    async fn run_sql(&self, remote: &dyn RemoteExecutor, sql: &str) -> Result<String> {
        Ok(self.superuser(remote).run(&Psql::statement(sql)).await?)
    }

    fn password_literal(&self) -> String {
        format!("'{}'", self.password.replace('\'', "''"))
    }

    async fn config_dir(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        Ok(format!(
            "/etc/postgresql/{}/main",
            self.short_version(remote).await?
        ))
    }

    /// Runs `body` with a `~/.pgpass` entry for this database in place. The
    /// file is removed afterwards whether `body` succeeded or not.
    pub async fn with_pgpass<T, F, Fut>(&self, remote: &dyn RemoteExecutor, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let scope = Scope::new(remote);
        let entry = format!("*:*:{}:{}:{}", self.database_name, self.user, self.password);
        scope
            .run(&ShellCommand::new("echo").arg(entry).redirect_to(PGPASS))
            .await?;

        let result = match scope
            .run(&ShellCommand::new("chmod").arg("0600").arg(PGPASS))
            .await
        {
            Ok(_) => body().await,
            Err(err) => Err(err.into()),
        };

        let cleanup = scope
            .run(&ShellCommand::new("rm").arg("-f").arg(PGPASS))
            .await;
        match (result, cleanup) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!("Failed to remove {}: {}", PGPASS, cleanup_err);
                }
                Err(err)
            }
        }
    }

    async fn fix_ownership(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        self.run_sql(remote, &format!("GRANT ALL ON SCHEMA public TO {}", self.user))
            .await?;
        self.run_sql(
            remote,
            &format!("ALTER DATABASE {} OWNER TO {}", self.database_name, self.user),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseManager for PostgresManager {
    async fn create_user(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        info!("Creating database user {}", self.user);
        self.run_sql(
            remote,
            &format!("CREATE USER {} WITH PASSWORD {}", self.user, self.password_literal()),
        )
        .await?;
        Ok(())
    }

    async fn create_database(
        &self,
        remote: &dyn RemoteExecutor,
        delete_if_exists: bool,
    ) -> Result<CreateStatus> {
        if delete_if_exists && self.database_exists(remote).await? {
            self.drop_database(remote).await?;
        }
        if self.database_exists(remote).await? {
            info!("Database {} already exists", self.database_name);
            return Ok(CreateStatus::AlreadyExists);
        }

        info!("Creating database {}", self.database_name);
        self.run_sql(
            remote,
            &format!(
                "CREATE DATABASE {} WITH OWNER {} ENCODING 'UNICODE' TEMPLATE template0",
                self.database_name, self.user
            ),
        )
        .await?;
        Ok(CreateStatus::Created)
    }

    async fn drop_database(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        warn!("Dropping database {}", self.database_name);
        // open connections block DROP DATABASE
        Scope::new(remote)
            .sudo()
            .run(&ShellCommand::new("service").args(["postgresql", "restart"]))
            .await?;
        self.run_sql(remote, &format!("DROP DATABASE {}", self.database_name))
            .await?;
        Ok(())
    }

    async fn database_exists(&self, remote: &dyn RemoteExecutor) -> Result<bool> {
        let exists = Psql::command(&PsqlOptions {
            database: Some("template1".to_string()),
            command: Some(format!(
                "SELECT 1 AS result FROM pg_database WHERE datname='{}'",
                self.database_name
            )),
            ..Default::default()
        });
        let output = self.superuser(remote).run(&exists).await?;
        if output.contains('0') {
            Ok(false)
        } else if output.contains('1') {
            Ok(true)
        } else {
            Err(StackError::unknown_result("PostgreSQL", output))
        }
    }

    async fn configure(&self, remote: &dyn RemoteExecutor, enable_remote_access: bool) -> Result<()> {
        if !enable_remote_access {
            return Ok(());
        }
        let dir = self.config_dir(remote).await?;
        let root = Scope::new(remote).sudo();

        let pg_hba = format!("{}/pg_hba.conf", dir);
        let text = open_pg_hba(&root.read_file(&pg_hba).await?)?;
        root.write_file(&pg_hba, &unix_eol(&text)).await?;

        let postgresql_conf = format!("{}/postgresql.conf", dir);
        let text = listen_everywhere(&root.read_file(&postgresql_conf).await?)?;
        root.write_file(&postgresql_conf, &unix_eol(&text)).await?;
        Ok(())
    }

    async fn backup_database(
        &self,
        remote: &dyn RemoteExecutor,
        file_name: &str,
        zip: bool,
        folder: Option<&str>,
    ) -> Result<String> {
        let folder = folder
            .unwrap_or(self.backup_folder.as_str())
            .trim_end_matches('/')
            .to_string();
        Scope::new(remote)
            .sudo()
            .dir_ensure(&folder, &DirOptions::recursive().mode("777"))
            .await?;

        let path = format!("{}/{}", folder, file_name);
        info!("Dumping {} to {}", self.database_name, path);
        let dump = PgDump::command(&PgDumpOptions {
            database: self.database_name.clone(),
            output: path.clone(),
            gzip: zip,
            no_owner: zip,
            no_privileges: zip,
        });
        self.with_pgpass(remote, || async {
            self.superuser(remote).run(&dump).await?;
            Ok::<_, StackError>(())
        })
        .await?;
        Ok(path)
    }

    async fn init_database(
        &self,
        remote: &dyn RemoteExecutor,
        sql_file: &str,
        delete_if_exists: bool,
        unzip: bool,
    ) -> Result<()> {
        self.create_database(remote, delete_if_exists).await?;
        info!("Loading {} into {}", sql_file, self.database_name);
        let load = Psql::load(sql_file, unzip, &self.database_name, &self.user);
        self.with_pgpass(remote, || async {
            Scope::new(remote).run(&load).await?;
            Ok::<_, StackError>(())
        })
        .await?;
        self.fix_ownership(remote).await
    }

    async fn version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        self.version
            .get_or_try_init(|| async {
                let output = Scope::new(remote).run(&Psql::version()).await?;
                parse_version(output.lines().next().unwrap_or_default())
            })
            .await
            .cloned()
    }

    async fn short_version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        parse_short_version(&self.version(remote).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::remote::testing::RecordingExecutor;

    const EXISTS: &str = " result \n--------\n      1\n(1 row)\n";
    const MISSING: &str = " result \n--------\n(0 rows)\n";

    fn manager() -> PostgresManager {
        PostgresManager::new("site", "site", "s3cret").unwrap()
    }

    #[test]
    fn rejects_non_identifier_names() {
        assert!(matches!(
            PostgresManager::new("site; DROP TABLE users", "site", "pw"),
            Err(StackError::InvalidValue { .. })
        ));
        assert!(PostgresManager::new("site", "1user", "pw").is_err());
    }

    #[tokio::test]
    async fn existence_check_parsing() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.respond_once("pg_database", EXISTS);
        remote.respond_once("pg_database", MISSING);
        remote.respond_once("pg_database", "psql: could not connect to server");

        assert!(db.database_exists(&remote).await.unwrap());
        assert!(!db.database_exists(&remote).await.unwrap());
        assert!(matches!(
            db.database_exists(&remote).await,
            Err(StackError::UnknownResult { .. })
        ));
        assert_eq!(
            remote.commands()[0],
            "sudo[postgres]: psql template1 -c 'SELECT 1 AS result FROM pg_database WHERE datname='\\''site'\\'''"
        );
    }

    #[tokio::test]
    async fn existing_database_is_left_alone() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.respond("pg_database", EXISTS);

        assert_eq!(
            db.create_database(&remote, false).await.unwrap(),
            CreateStatus::AlreadyExists
        );
        assert_eq!(remote.commands().len(), 1);
        assert!(remote.position("DROP").is_none());
        assert!(remote.position("CREATE").is_none());
    }

    #[tokio::test]
    async fn delete_if_exists_drops_then_creates() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.respond_once("pg_database", EXISTS);
        remote.respond_once("pg_database", MISSING);

        assert_eq!(db.create_database(&remote, true).await.unwrap(), CreateStatus::Created);

        let drop = remote.position("DROP DATABASE site").unwrap();
        let create = remote.position("CREATE DATABASE site WITH OWNER site").unwrap();
        assert!(remote.position("sudo: service postgresql restart").unwrap() < drop);
        assert!(drop < create);
    }

    #[tokio::test]
    async fn remote_access_rewrites_both_config_files() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.respond("psql --version", "psql (PostgreSQL) 9.1.3\ncontains support for command-line editing\n");
        remote.put_file(
            "/etc/postgresql/9.1/main/pg_hba.conf",
            "local   all             postgres                                peer\r\nlocal   all             all                                     peer\r\nhost    all             all             127.0.0.1/32            md5\r\n",
        );
        remote.put_file(
            "/etc/postgresql/9.1/main/postgresql.conf",
            "#listen_addresses = 'localhost'\t\t# what IP address(es) to listen on;\nport = 5432\n",
        );

        db.configure(&remote, true).await.unwrap();

        assert_eq!(
            remote.file("/etc/postgresql/9.1/main/pg_hba.conf").unwrap(),
            "local   all             postgres                                peer\nlocal\tall\tall\t\tmd5\nhost\tall\tall\t0.0.0.0/0\tmd5\n"
        );
        assert_eq!(
            remote.file("/etc/postgresql/9.1/main/postgresql.conf").unwrap(),
            "listen_addresses = '*'\t\nport = 5432\n"
        );

        let first = remote.file("/etc/postgresql/9.1/main/pg_hba.conf").unwrap();
        db.configure(&remote, true).await.unwrap();
        assert_eq!(remote.file("/etc/postgresql/9.1/main/pg_hba.conf").unwrap(), first);
    }

    #[tokio::test]
    async fn pgpass_is_removed_when_the_dump_fails() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.fail_on("pg_dump");

        let result = db.backup_database(&remote, "site_db_1.sql.gz", true, None).await;

        assert!(matches!(result, Err(StackError::Remote(_))));
        assert_eq!(
            remote.commands(),
            vec![
                "sudo: mkdir -p /tmp",
                "sudo: chmod -R 777 /tmp",
                "run: echo '*:*:site:site:s3cret' > ~/.pgpass",
                "run: chmod 0600 ~/.pgpass",
                "sudo[postgres]: pg_dump -O -x site | gzip > /tmp/site_db_1.sql.gz",
                "run: rm -f ~/.pgpass",
            ]
        );
    }

    #[tokio::test]
    async fn init_database_loads_the_dump_and_fixes_ownership() {
        let db = manager();
        let remote = RecordingExecutor::new("db1");
        remote.respond("pg_database", MISSING);

        db.init_database(&remote, "/home/deploy/site_db_1.sql.gz", false, true)
            .await
            .unwrap();

        let commands = remote.commands();
        let tail: Vec<&str> = commands[commands.len() - 6..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "run: echo '*:*:site:site:s3cret' > ~/.pgpass",
                "run: chmod 0600 ~/.pgpass",
                "run: cat /home/deploy/site_db_1.sql.gz | gunzip | psql site -w -U site",
                "run: rm -f ~/.pgpass",
                "sudo[postgres]: echo 'GRANT ALL ON SCHEMA public TO site' | psql",
                "sudo[postgres]: echo 'ALTER DATABASE site OWNER TO site' | psql",
            ]
        );
    }

    #[tokio::test]
    async fn create_user_escapes_the_password() {
        let db = PostgresManager::new("site", "site", "it's").unwrap();
        let remote = RecordingExecutor::new("db1");
        db.create_user(&remote).await.unwrap();
        assert_eq!(
            remote.commands(),
            vec!["sudo[postgres]: echo 'CREATE USER site WITH PASSWORD '\\''it'\\'''\\''s'\\''' | psql"]
        );
    }
}
