//! HttpLogger library exports

pub mod config;
pub mod error;
pub mod models;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod storage;

pub use routes::router;
