pub mod data_cache;
pub mod error;
pub mod rdbfile;

pub use data_cache::*;
pub use error::*;
pub use rdbfile::*;
