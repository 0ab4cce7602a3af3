pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod prediction;
pub mod readings;
pub mod refresh;
pub mod state;
