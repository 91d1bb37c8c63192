//! PostgreSQL support: the database manager used by stacks and builders for
//! the `psql`/`pg_dump` command lines it issues.

pub mod manager;
pub mod wrapper;

pub use manager::PostgresManager;
