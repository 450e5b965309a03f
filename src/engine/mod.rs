//! Core engine: the campaign ledger, strike execution, and the controller loop.

pub mod accountant;
pub mod campaign;
pub mod executor;
