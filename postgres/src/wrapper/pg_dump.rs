use common::remote::ShellCommand;

/// Options for a `pg_dump` command line
pub struct PgDumpOptions {
    pub database: String,
    /// `-O`: skip ownership commands so the dump loads under any owner
    pub no_owner: bool,
    /// `-x`: skip GRANT/REVOKE
    pub no_privileges: bool,
    pub gzip: bool,
    pub output: String,
}

impl Default for PgDumpOptions {
    fn default() -> Self {
        Self {
            database: "postgres".to_string(),
            no_owner: true,
            no_privileges: true,
            gzip: true,
            output: "dump.sql.gz".to_string(),
        }
    }
}

/// Builds `pg_dump` invocations
pub struct PgDump;

impl PgDump {
    pub fn command(options: &PgDumpOptions) -> ShellCommand {
        let mut cmd = ShellCommand::new("pg_dump");
        if options.no_owner {
            cmd = cmd.arg("-O");
        }
        if options.no_privileges {
            cmd = cmd.arg("-x");
        }
        cmd = cmd.arg(&options.database);

        if options.gzip {
            cmd.pipe(ShellCommand::new("gzip")).redirect_to(&options.output)
        } else {
            cmd.redirect_to(&options.output)
        }
    }

    pub fn version() -> ShellCommand {
        ShellCommand::new("pg_dump").arg("--version")
    }
}
