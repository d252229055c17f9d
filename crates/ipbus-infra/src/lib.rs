//! Infrastructure layer for ipbus.
//!
//! Contains the in-process implementation of the `BusEngine` trait defined in
//! `ipbus-core`, the reusing region allocator it hands shared buffers out of,
//! and the configuration loader.

pub mod config;
pub mod local_engine;
pub mod region_arena;

pub use local_engine::LocalEngine;
pub use region_arena::RegionArena;

#[cfg(test)]
mod end_to_end;
