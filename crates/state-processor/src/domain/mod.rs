//! # Domain Layer
//!
//! Pure domain logic for block processing and execution recording.
//! Nothing in here talks to a store or an engine.
//!
//! ## Modules
//!
//! - `value_objects` - Address, Hash, Bytes, Bloom
//! - `entities` - Blocks, transactions, outcomes, receipts
//! - `services` - Keccak, CREATE address derivation, bloom aggregation
//! - `gas_pool` - Per-block gas budget
//! - `trace` - Per-transaction trace accumulator
//! - `records` - Persisted document shapes
//! - `staging` - Fixed-capacity write-behind buffer
//! - `receipt_builder` - Pure receipt assembly

pub mod entities;
pub mod gas_pool;
pub mod receipt_builder;
pub mod records;
pub mod services;
pub mod staging;
pub mod trace;
pub mod value_objects;
