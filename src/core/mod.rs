//! Core types, constants, errors and collaborator traits.
//!
//! Everything here is shared by the crypto, transport and key management
//! layers and has no dependencies beyond the crypto primitives.

mod constants;
mod error;
mod traits;
mod types;

pub use constants::*;
pub use error::*;
pub use traits::*;
pub use types::*;
