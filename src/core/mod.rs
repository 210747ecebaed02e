pub mod config;
pub mod errors;
pub mod kernel;
pub mod pagination;
pub mod result;
pub mod types;
