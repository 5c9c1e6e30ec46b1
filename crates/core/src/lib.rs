//! Shared building blocks for the CareLink presence channel.
//!
//! Both the client-side channel (`carelink-presence`) and the event hub
//! (`carelink-api`) depend on this crate for the wire protocol, the id
//! aliases and the domain error type.

pub mod error;
pub mod protocol;
pub mod types;
