//! Storage of the postal addresses attached to incident reports
//! ("signalements"), backed by PostgreSQL/PostGIS through diesel.

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
extern crate dotenv;

pub mod data;
pub mod db;


pub use crate::data::error::{RepoError, RepoResult};
pub use crate::data::models::{Address, CoordinateSystem, ReportRef};
pub use crate::data::repo::addresses::{AddressRepository, MALFORMED_BATCH_SIZE};
pub use crate::db::{init_connection_pool, run_migrations, ConfigError, DbConfig, Pool};
