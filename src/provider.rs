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

//! Key-derivation provider boundary.
//!
//! The validator core never performs curve arithmetic itself: everything
//! that touches secp256k1 or BIP32 child derivation goes through the
//! [`DerivationProvider`] trait, and provider failures surface as the
//! structured [`ProviderError`] taxonomy rather than raw library errors.

use bitcoin::secp256k1::{PublicKey, SecretKey, SECP256K1};
use bitcoin::util::base58;
use bitcoin::util::bip32::{
    self, ChainCode, ChildNumber, ExtendedPrivKey, ExtendedPubKey, Fingerprint,
};
use bitcoin::Network;
use zeroize::Zeroizing;

/// Version magic for mainnet extended public keys.
pub const VERSION_MAGIC_XPUB: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
/// Version magic for mainnet extended private keys.
pub const VERSION_MAGIC_XPRV: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];

/// Length of a serialized extended key payload (sans base58 checksum).
const XKEY_LEN: usize = 78;

/// Errors reported by a key-derivation provider.
///
/// Deserialization failures are classified structurally from the decoded
/// payload, never by matching library error strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ProviderError {
    /// invalid checksum
    ChecksumInvalid,

    /// invalid base58 encoding of an extended key
    InvalidEncoding,

    /// encoded extended key data has wrong length {0}
    WrongLength(usize),

    /// unknown extended key version
    UnknownVersion([u8; 4]),

    /// prvkey version / pubkey mismatch
    PrvVersionPubKey,

    /// pubkey version / prvkey mismatch
    PubVersionPrvKey,

    /// invalid prvkey prefix byte {0}
    InvalidPrvPrefix(u8),

    /// invalid pubkey prefix byte {0}
    InvalidPubPrefix(u8),

    /// private key not in 1..n-1
    PrivateScalarOutOfRange,

    /// pubkey is not a valid point on the secp256k1 curve
    PointNotOnCurve,

    /// hardened derivation is impossible for an extended public key
    HardenedFromPublic,

    /// child number {0} is out of range
    InvalidChildNumber(u32),

    /// failure in the underlying secp256k1 library
    InternalFailure,
}

impl From<bip32::Error> for ProviderError {
    fn from(err: bip32::Error) -> Self {
        match err {
            bip32::Error::CannotDeriveFromHardenedKey => ProviderError::HardenedFromPublic,
            bip32::Error::Secp256k1(secp256k1::Error::InvalidSecretKey) => {
                ProviderError::PrivateScalarOutOfRange
            }
            bip32::Error::Secp256k1(secp256k1::Error::InvalidPublicKey) => {
                ProviderError::PointNotOnCurve
            }
            bip32::Error::Secp256k1(_) => ProviderError::InternalFailure,
            bip32::Error::InvalidChildNumber(no) => ProviderError::InvalidChildNumber(no),
            bip32::Error::InvalidChildNumberFormat => ProviderError::InternalFailure,
            bip32::Error::InvalidDerivationPathFormat => ProviderError::InternalFailure,
            bip32::Error::UnknownVersion(version) => ProviderError::UnknownVersion(version),
            bip32::Error::WrongExtendedKeyLength(len) => ProviderError::WrongLength(len),
            bip32::Error::Base58(base58::Error::BadChecksum(..)) => ProviderError::ChecksumInvalid,
            bip32::Error::Base58(_) => ProviderError::InvalidEncoding,
            _ => ProviderError::InternalFailure,
        }
    }
}

/// Extended key of either kind, as returned by a provider.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum XKey {
    /// Extended private key (`xprv`).
    Private(ExtendedPrivKey),
    /// Extended public key (`xpub`).
    Public(ExtendedPubKey),
}

impl XKey {
    /// Depth in the derivation tree declared by the serialization.
    pub fn depth(&self) -> u8 {
        match self {
            XKey::Private(xprv) => xprv.depth,
            XKey::Public(xpub) => xpub.depth,
        }
    }

    /// Fingerprint of the parent key declared by the serialization.
    pub fn parent_fingerprint(&self) -> Fingerprint {
        match self {
            XKey::Private(xprv) => xprv.parent_fingerprint,
            XKey::Public(xpub) => xpub.parent_fingerprint,
        }
    }

    /// Child number declared by the serialization, in raw `u32` form.
    pub fn child_number(&self) -> u32 {
        match self {
            XKey::Private(xprv) => u32::from(xprv.child_number),
            XKey::Public(xpub) => u32::from(xpub.child_number),
        }
    }

    /// Whether the key carries private material.
    pub fn has_private(&self) -> bool { matches!(self, XKey::Private(_)) }

    /// Compressed SEC serialization of the public key part.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        match self {
            XKey::Private(xprv) => {
                PublicKey::from_secret_key(SECP256K1, &xprv.private_key).serialize()
            }
            XKey::Public(xpub) => xpub.public_key.serialize(),
        }
    }

    /// Base58check `xpub` serialization (computed from the private key when
    /// necessary).
    pub fn serialize_public(&self) -> String {
        match self {
            XKey::Private(xprv) => ExtendedPubKey::from_priv(SECP256K1, xprv).to_string(),
            XKey::Public(xpub) => xpub.to_string(),
        }
    }

    /// Base58check `xprv` serialization, present only when the key carries
    /// private material. The returned buffer is zeroed on drop.
    pub fn serialize_private(&self) -> Option<Zeroizing<String>> {
        match self {
            XKey::Private(xprv) => Some(Zeroizing::new(xprv.to_string())),
            XKey::Public(_) => None,
        }
    }
}

/// Capability used by the validator core for everything involving curve
/// math or BIP32 derivation.
pub trait DerivationProvider {
    /// Computes the BIP32 master key for a seed of 16-64 bytes.
    fn master_from_seed(&self, seed: &[u8]) -> Result<XKey, ProviderError>;

    /// Parses a base58check-serialized extended key.
    fn deserialize(&self, s: &str) -> Result<XKey, ProviderError>;

    /// Derives a child key; the top bit of `index` encodes "hardened".
    fn derive_child(&self, key: &XKey, index: u32) -> Result<XKey, ProviderError>;

    /// Checks that a SEC-encoded public key is a valid curve point.
    fn is_point_on_curve(&self, pubkey: &[u8]) -> bool;
}

/// Default provider backed by the global secp256k1 context.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Secp256k1Provider;

impl DerivationProvider for Secp256k1Provider {
    fn master_from_seed(&self, seed: &[u8]) -> Result<XKey, ProviderError> {
        let xprv = ExtendedPrivKey::new_master(Network::Bitcoin, seed)?;
        Ok(XKey::Private(xprv))
    }

    fn deserialize(&self, s: &str) -> Result<XKey, ProviderError> {
        let data = base58::from_check(s).map_err(|err| match err {
            base58::Error::BadChecksum(..) => ProviderError::ChecksumInvalid,
            _ => ProviderError::InvalidEncoding,
        })?;
        if data.len() != XKEY_LEN {
            return Err(ProviderError::WrongLength(data.len()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        let depth = data[4];
        let parent_fingerprint = Fingerprint::from(&data[5..9]);
        let mut child = [0u8; 4];
        child.copy_from_slice(&data[9..13]);
        let child_number = ChildNumber::from(u32::from_be_bytes(child));
        let chain_code = ChainCode::from(&data[13..45]);
        // Marker byte distinguishing key payloads: 0x00 for a private
        // scalar, 0x02/0x03 for a compressed public point.
        let marker = data[45];

        match version {
            VERSION_MAGIC_XPRV => {
                match marker {
                    0x00 => {}
                    0x02 | 0x03 => return Err(ProviderError::PrvVersionPubKey),
                    wrong => return Err(ProviderError::InvalidPrvPrefix(wrong)),
                }
                let private_key = SecretKey::from_slice(&data[46..78])
                    .map_err(|_| ProviderError::PrivateScalarOutOfRange)?;
                Ok(XKey::Private(ExtendedPrivKey {
                    network: Network::Bitcoin,
                    depth,
                    parent_fingerprint,
                    child_number,
                    private_key,
                    chain_code,
                }))
            }
            VERSION_MAGIC_XPUB => {
                match marker {
                    0x02 | 0x03 => {}
                    0x00 => return Err(ProviderError::PubVersionPrvKey),
                    wrong => return Err(ProviderError::InvalidPubPrefix(wrong)),
                }
                let public_key = PublicKey::from_slice(&data[45..78])
                    .map_err(|_| ProviderError::PointNotOnCurve)?;
                Ok(XKey::Public(ExtendedPubKey {
                    network: Network::Bitcoin,
                    depth,
                    parent_fingerprint,
                    child_number,
                    public_key,
                    chain_code,
                }))
            }
            unknown => Err(ProviderError::UnknownVersion(unknown)),
        }
    }

    fn derive_child(&self, key: &XKey, index: u32) -> Result<XKey, ProviderError> {
        let child = ChildNumber::from(index);
        match key {
            XKey::Private(xprv) => Ok(XKey::Private(xprv.ckd_priv(SECP256K1, child)?)),
            XKey::Public(xpub) => Ok(XKey::Public(xpub.ckd_pub(SECP256K1, child)?)),
        }
    }

    fn is_point_on_curve(&self, pubkey: &[u8]) -> bool { PublicKey::from_slice(pubkey).is_ok() }
}

#[cfg(test)]
mod test {
    use super::*;

    // BIP32 test vector 1, chain m.
    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";

    fn mutated(xkey: &str, mutate: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut data = base58::from_check(xkey).unwrap();
        mutate(&mut data);
        base58::check_encode_slice(&data)
    }

    #[test]
    fn deserialize_round_trip() {
        let provider = Secp256k1Provider;
        let xpub = provider.deserialize(XPUB).unwrap();
        assert!(!xpub.has_private());
        assert_eq!(xpub.serialize_public(), XPUB);
        assert_eq!(xpub.serialize_private(), None);

        let xprv = provider.deserialize(XPRV).unwrap();
        assert!(xprv.has_private());
        assert_eq!(xprv.serialize_public(), XPUB);
        assert_eq!(xprv.serialize_private().unwrap().as_str(), XPRV);
    }

    #[test]
    fn bad_checksum() {
        // Flip the final character to break the base58 checksum.
        let mut broken = String::from(&XPUB[..XPUB.len() - 1]);
        broken.push(if XPUB.ends_with('8') { '9' } else { '8' });
        assert_eq!(
            Secp256k1Provider.deserialize(&broken),
            Err(ProviderError::ChecksumInvalid)
        );
    }

    #[test]
    fn version_and_marker_classification() {
        let provider = Secp256k1Provider;

        let foreign = mutated(XPUB, |data| data[0..4].copy_from_slice(&[0x02, 0xfa, 0xca, 0xfd]));
        assert_eq!(
            provider.deserialize(&foreign),
            Err(ProviderError::UnknownVersion([0x02, 0xfa, 0xca, 0xfd]))
        );

        let prv_payload = mutated(XPUB, |data| data[45] = 0x00);
        assert_eq!(
            provider.deserialize(&prv_payload),
            Err(ProviderError::PubVersionPrvKey)
        );

        let bad_pub_prefix = mutated(XPUB, |data| data[45] = 0x04);
        assert_eq!(
            provider.deserialize(&bad_pub_prefix),
            Err(ProviderError::InvalidPubPrefix(0x04))
        );

        let pub_payload = mutated(XPRV, |data| data[45] = 0x02);
        assert_eq!(
            provider.deserialize(&pub_payload),
            Err(ProviderError::PrvVersionPubKey)
        );

        let bad_prv_prefix = mutated(XPRV, |data| data[45] = 0x01);
        assert_eq!(
            provider.deserialize(&bad_prv_prefix),
            Err(ProviderError::InvalidPrvPrefix(0x01))
        );

        let zero_scalar = mutated(XPRV, |data| {
            for byte in &mut data[46..78] {
                *byte = 0;
            }
        });
        assert_eq!(
            provider.deserialize(&zero_scalar),
            Err(ProviderError::PrivateScalarOutOfRange)
        );
    }

    #[test]
    fn truncated_payload() {
        let short = mutated(XPUB, |data| data.truncate(40));
        assert_eq!(
            Secp256k1Provider.deserialize(&short),
            Err(ProviderError::WrongLength(40))
        );
    }

    #[test]
    fn hardened_derivation_needs_private_key() {
        let provider = Secp256k1Provider;
        let xpub = provider.deserialize(XPUB).unwrap();
        assert_eq!(
            provider.derive_child(&xpub, 1 << 31),
            Err(ProviderError::HardenedFromPublic)
        );
        assert!(provider.derive_child(&xpub, 0).is_ok());
    }

    #[test]
    fn point_check() {
        let provider = Secp256k1Provider;
        let xpub = provider.deserialize(XPUB).unwrap();
        assert!(provider.is_point_on_curve(&xpub.public_key_bytes()));
        assert!(!provider.is_point_on_curve(&[0x02; 33]));
    }
}
