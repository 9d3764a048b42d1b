pub mod calendar;
pub mod config;
pub mod engine;
pub mod filter;
pub mod limits;
pub mod model;
pub mod observability;
pub mod source;
