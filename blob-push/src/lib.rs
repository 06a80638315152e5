pub mod cli;
pub mod destination;
pub mod load_config;
pub mod s3;

pub use cli::{run, Cli, Commands};
