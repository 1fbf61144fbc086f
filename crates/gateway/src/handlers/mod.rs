//! API handlers module

pub mod actions;
pub mod admin;
pub mod health;
pub mod messages;
pub mod sessions;
