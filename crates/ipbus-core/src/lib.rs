//! Client-side messaging contract for ipbus.
//!
//! This crate defines the [`BusEngine`](engine::BusEngine) boundary that a
//! bus implementation satisfies, and builds the session, sender and receiver
//! APIs on top of it. It depends only on `ipbus-types` -- never on
//! `ipbus-infra` or any concrete engine.

pub mod engine;
pub mod receiver;
pub mod region;
pub mod sender;
pub mod session;

pub use engine::{BusEngine, JoinRequest, Message, Resource};
pub use receiver::{CloseHandle, Receiver};
pub use region::{MemoryRegion, RegionError, RegionView, RegionViewMut};
pub use sender::Sender;
pub use session::{Session, join, join_with_config};
