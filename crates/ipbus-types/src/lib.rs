//! Shared domain types for ipbus.
//!
//! This crate contains the addressing and payload types exchanged between a
//! bus client and a bus engine: labels and label expressions, selectors,
//! byte envelopes, join options, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, semver, thiserror.

pub mod config;
pub mod error;
pub mod label;
pub mod message;
pub mod options;
pub mod selector;
pub mod version;

pub use label::{LabelOp, LabelSet};
pub use message::{BytesMessage, Object, SessionHandle};
pub use options::Options;
pub use selector::{Selector, SelectorMode};
pub use version::Version;
