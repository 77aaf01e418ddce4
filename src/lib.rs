//! MediCab realtime coordination server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod realtime;
pub mod ride;
pub mod routes;
pub mod state;
pub mod ws;
