//! Core of a self-hosted photo gallery: the album tree, access control,
//! thumbnails, search, sorting and password unlock, on top of SQLite.

pub mod access;
pub mod albums;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod hashing;
pub mod models;
pub mod photos;
pub mod query;
pub mod schema;
pub mod search;
pub mod session;
pub mod sorting;
pub mod thumbs;
pub mod tree;
pub mod unlock;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
