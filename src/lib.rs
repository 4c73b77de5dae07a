// BIP-380 output script descriptor validation toolkit
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! Validation toolkit for BIP-380 output script descriptors.
//!
//! Covers the descriptor checksum codec, key and script expression
//! grammars and BIP32 key derivation from seeds and serialized extended
//! keys. Curve arithmetic is isolated behind the
//! [`provider::DerivationProvider`] trait; the grammars themselves are
//! pure string processing.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;

pub mod checksum;
pub mod derive;
pub mod keyexpr;
pub mod path;
pub mod provider;
pub mod script;

pub use checksum::ChecksumError;
pub use derive::{DeriveError, SeedError};
pub use keyexpr::{KeyExpr, KeyExpressionError};
pub use path::{DerivationSubpath, PathError, PathStep};
pub use provider::{DerivationProvider, ProviderError, Secp256k1Provider, XKey};
pub use script::{ChecksumMode, ScriptError, ScriptExpr};

/// First index requiring hardened derivation (2 to the power of 31).
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;
