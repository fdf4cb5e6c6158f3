//! Public extension contracts for call sites.

pub mod request_signer;

pub use request_signer::*;
