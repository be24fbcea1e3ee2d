//! 9P2000.L client transport, per §4.7/§6.

pub mod client;
pub mod wire;

pub use client::{FidPool, NinepFile, NinepTransport, Session};
