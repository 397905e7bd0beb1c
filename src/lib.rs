//! Core library for the dualboard aggregation layer.
//!
//! Records live in two independently administered partitions. The library
//! merges them into unified views and keeps those views current from both
//! partitions' change notifications. Backend capabilities live in
//! [`partition`], record shapes in [`model`], per-entity combining rules in
//! [`policy`], one-shot aggregation in [`aggregate`], standing views in
//! [`live`], and the public entry points in [`sync`]. Concrete backends used
//! by tests and the command line sit under [`io`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod io;
pub mod live;
pub mod model;
pub mod partition;
pub mod policy;
pub mod sync;

pub use error::{Result, SyncError};
pub use sync::DualSource;
