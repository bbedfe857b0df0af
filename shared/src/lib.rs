pub mod config;
pub mod logging;
pub mod series;

pub use config::*;
pub use series::*;
