pub mod config;
pub mod cycle;
pub mod reduce;
pub mod retry;
pub mod sen5x;
pub mod sink;
