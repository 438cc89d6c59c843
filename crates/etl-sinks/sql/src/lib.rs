mod config;
mod factory;
mod sql_sink;
mod type_mapping;

pub use config::{PostgresConfig, SqliteConfig, TableOptions};
pub use factory::{PostgresSinkFactory, SqliteSinkFactory};
pub use sql_sink::{Dialect, SqlSink};
pub use type_mapping::TypeMapping;
