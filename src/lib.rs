//! SkyMessage relay server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod calls;
pub mod config;
pub mod messages;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;
pub mod ws;
