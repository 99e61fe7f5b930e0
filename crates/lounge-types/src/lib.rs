//! Shared domain and wire types for the lounge chat backend.

pub mod api;
pub mod events;
pub mod files;
pub mod models;
