pub mod pg_dump;
pub mod psql;

pub use pg_dump::{PgDump, PgDumpOptions};
pub use psql::{Psql, PsqlOptions};
