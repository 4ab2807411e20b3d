//! Platform session: request correlation, push dispatch, place and
//! session lifecycle, and the per-place subsystem catalog.

mod catalog;
mod client;

pub use catalog::SubsystemCatalog;
pub use client::ClientSession;
