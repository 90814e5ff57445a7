/// Storage abstraction layer
///
/// Persists monitor definitions, raw check history and hourly aggregates in
/// a local libsql database behind the `Storage` trait.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{LibsqlStorage, Storage};
