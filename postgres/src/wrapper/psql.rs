use common::remote::ShellCommand;

/// Options for a `psql` command line
#[derive(Default)]
pub struct PsqlOptions {
    pub database: Option<String>,
    pub user: Option<String>,
    /// `-w`: never prompt, rely on `.pgpass`
    pub no_password: bool,
    /// `-c`: run one statement and exit
    pub command: Option<String>,
}

/// Builds `psql` invocations
pub struct Psql;

impl Psql {
    pub fn command(options: &PsqlOptions) -> ShellCommand {
        let mut cmd = ShellCommand::new("psql");
        if let Some(database) = &options.database {
            cmd = cmd.arg(database);
        }
        if options.no_password {
            cmd = cmd.arg("-w");
        }
        if let Some(user) = &options.user {
            cmd = cmd.arg("-U").arg(user);
        }
        if let Some(sql) = &options.command {
            cmd = cmd.arg("-c").arg(sql);
        }
        cmd
    }

    /// `echo <sql> | psql`, for statements run by the superuser.
    pub fn statement(sql: &str) -> ShellCommand {
        ShellCommand::new("echo")
            .arg(sql)
            .pipe(Self::command(&PsqlOptions::default()))
    }

    /// Streams a dump file into `database` as `user`.
    pub fn load(file: &str, gunzip: bool, database: &str, user: &str) -> ShellCommand {
        let mut cmd = ShellCommand::new("cat").arg(file);
        if gunzip {
            cmd = cmd.pipe(ShellCommand::new("gunzip"));
        }
        cmd.pipe(Self::command(&PsqlOptions {
            database: Some(database.to_string()),
            user: Some(user.to_string()),
            no_password: true,
            command: None,
        }))
    }

    pub fn version() -> ShellCommand {
        ShellCommand::new("psql").arg("--version")
    }
}
