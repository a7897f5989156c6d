//! # Validation
//!
//! Tamper detection over an ordered block sequence. See
//! [`validator`] for the exact checks and the link policies.

pub mod validator;

pub use validator::{
    invalid_block_indices, is_chain_valid, BlockFault, ChainValidator, FaultKind, LinkPolicy,
    ValidationReport,
};
