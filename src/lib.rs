//! filecast server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod greeting;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod users;
