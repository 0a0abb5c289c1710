//! Collision tests shared by gameplay systems.

pub mod collision;

pub use collision::*;
