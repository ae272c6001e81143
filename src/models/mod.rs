//! Data models for MRT records and common network types.

pub mod mrt;
pub mod network;

pub use mrt::*;
pub use network::*;
