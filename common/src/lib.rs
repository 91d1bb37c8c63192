pub mod config;
pub mod naming;
pub mod remote;
pub mod text;
