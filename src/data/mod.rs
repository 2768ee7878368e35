pub mod error;
pub mod models;
pub mod repair;
pub mod repo;
pub mod schema;
