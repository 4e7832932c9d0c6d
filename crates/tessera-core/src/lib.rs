//! Tessera Core - Core types, cryptography, and serialization
//!
//! This crate provides the foundational types shared by the Tessera
//! agreement protocol: node identities, positions, blocks, votes, pull
//! requests and the signer used to produce and check their signatures.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod signer;
pub mod types;

pub use crypto::{hash_blake3, sign, verify, Hash, KeyPair, PublicKey, SecretKey, Sig};
pub use error::CoreError;
pub use signer::Signer;
pub use types::*;
