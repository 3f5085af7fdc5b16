pub mod clean;
pub mod config;
pub mod pipeline;
pub mod sas;
pub mod session;
pub mod sink;
