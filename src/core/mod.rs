pub mod config;
pub mod jobs;
pub mod lifecycle;
pub mod models;
pub mod store;
pub mod terminal;
pub mod validation;
