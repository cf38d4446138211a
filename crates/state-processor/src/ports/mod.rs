//! # Ports Layer
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving port (the block processing API)
//! - `outbound.rs` - Driven ports (engine, signer, state, consensus, store, error log)

pub mod inbound;
pub mod outbound;
