mod csv_source;
mod json_source;
mod factory;

pub use csv_source::{CsvConfig, CsvSource};
pub use json_source::{JsonConfig, JsonSource};
pub use factory::{CsvSourceFactory, JsonSourceFactory};
