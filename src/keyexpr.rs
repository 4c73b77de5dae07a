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

//! Key expression validation: `[origin]key/path` tokens embedded in script
//! expressions (BIP-380 key expressions).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin::hashes::hex::FromHex;
use bitcoin::util::base58;

use crate::path::{PathError, PathStep, HARDENED_MARKERS};
use crate::provider::{DerivationProvider, XKey};

/// WIF version byte for mainnet private keys.
const WIF_VERSION: u8 = 0x80;

/// Errors of key expression validation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum KeyExpressionError {
    /// multiple key origins: {0}
    MultipleOrigins(String),

    /// unterminated key origin: {0}
    UnterminatedOrigin(String),

    /// missing key origin start: {0}
    MissingOriginStart(String),

    /// empty key origin: {0}
    EmptyOrigin(String),

    /// invalid key origin fingerprint: {0}
    InvalidFingerprint(String),

    /// trailing slash in key origin: {0}
    TrailingSlashInOrigin(String),

    /// children indicator in key origin: {0}
    WildcardInOrigin(String),

    /// invalid derivation step in key origin: {0}
    InvalidOriginIndex(String),

    /// key origin with no public key: {0}
    MissingKey(String),

    /// invalid key format: {0}
    InvalidKeyFormat(String),

    /// public key cannot have derivation path: {0}
    PublicKeyWithPath(String),

    /// private key with derivation: {0}
    PrivateKeyWithPath(String),

    /// private key with derivation children: {0}
    PrivateKeyWithChildren(String),

    /// {0}
    #[from]
    Path(PathError),
}

/// Key origin prefix `[fingerprint/steps]` of a key expression.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KeyOrigin {
    /// Fingerprint of the master key, exactly four bytes.
    pub master_fingerprint: [u8; 4],
    /// Derivation steps from the master key; never contains wildcards.
    pub derivation: Vec<PathStep>,
}

/// Classified key material of a key expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KeyMaterial {
    /// SEC-encoded public key given as 66 or 130 hex characters.
    HexPublicKey(Vec<u8>),
    /// WIF private key; holds the decoded base58check payload including
    /// the version byte.
    WifPrivateKey(Vec<u8>),
    /// BIP32 extended key of either kind.
    Extended(XKey),
}

/// Derivation step of a key expression path; unlike origin steps these may
/// end with a children wildcard.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TerminalStep {
    /// Concrete index step.
    Index(PathStep),
    /// Children wildcard `*` or `*'`, only valid in terminal position.
    Wildcard {
        /// Whether the wildcard children are derived hardened.
        hardened: bool,
    },
}

impl Display for TerminalStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStep::Index(step) => Display::fmt(step, f),
            TerminalStep::Wildcard { hardened: false } => f.write_str("*"),
            TerminalStep::Wildcard { hardened: true } => f.write_str("*'"),
        }
    }
}

/// Parsed and validated key expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyExpr {
    /// Optional `[fingerprint/path]` origin prefix.
    pub origin: Option<KeyOrigin>,
    /// The key itself.
    pub key: KeyMaterial,
    /// Derivation path after the key; non-empty only for extended keys.
    pub path: Vec<TerminalStep>,
}

impl KeyExpr {
    /// Validates a key expression, classifying the key part as hex public
    /// key, WIF private key or extended key (in that order) and enforcing
    /// the per-kind path allowance rules.
    pub fn parse<P: DerivationProvider>(
        provider: &P,
        expr: &str,
    ) -> Result<KeyExpr, KeyExpressionError> {
        if let Some(first) = expr.find('[') {
            if expr[first + 1..].contains('[') {
                return Err(KeyExpressionError::MultipleOrigins(expr.to_owned()));
            }
        }

        let (origin, key_and_path) = if expr.starts_with('[') {
            match expr.find(']') {
                Some(end) => (
                    Some(parse_origin(&expr[..=end])?),
                    &expr[end + 1..],
                ),
                None => return Err(KeyExpressionError::UnterminatedOrigin(expr.to_owned())),
            }
        } else if expr.contains(']') {
            return Err(KeyExpressionError::MissingOriginStart(expr.to_owned()));
        } else {
            (None, expr)
        };

        let (key_part, path_part) = match key_and_path.find('/') {
            Some(slash) => (&key_and_path[..slash], Some(&key_and_path[slash..])),
            None => (key_and_path, None),
        };
        if key_part.is_empty() {
            return Err(KeyExpressionError::MissingKey(expr.to_owned()));
        }

        if let Some(pubkey) = parse_hex_pubkey(key_part) {
            if path_part.is_some() {
                return Err(KeyExpressionError::PublicKeyWithPath(expr.to_owned()));
            }
            return Ok(KeyExpr {
                origin,
                key: KeyMaterial::HexPublicKey(pubkey),
                path: vec![],
            });
        }
        if let Some(payload) = decode_wif(key_part) {
            return match path_part {
                Some("/*") => Err(KeyExpressionError::PrivateKeyWithChildren(expr.to_owned())),
                Some(_) => Err(KeyExpressionError::PrivateKeyWithPath(expr.to_owned())),
                None => Ok(KeyExpr {
                    origin,
                    key: KeyMaterial::WifPrivateKey(payload),
                    path: vec![],
                }),
            };
        }
        if let Ok(xkey) = provider.deserialize(key_part) {
            let path = match path_part {
                Some(path) => parse_key_path(path)?,
                None => vec![],
            };
            return Ok(KeyExpr {
                origin,
                key: KeyMaterial::Extended(xkey),
                path,
            });
        }
        Err(KeyExpressionError::InvalidKeyFormat(expr.to_owned()))
    }
}

/// Parses a bracketed origin, `[` and `]` included.
fn parse_origin(origin: &str) -> Result<KeyOrigin, KeyExpressionError> {
    let content = &origin[1..origin.len() - 1];
    if content.is_empty() {
        return Err(KeyExpressionError::EmptyOrigin(origin.to_owned()));
    }
    if content.ends_with('/') {
        return Err(KeyExpressionError::TrailingSlashInOrigin(origin.to_owned()));
    }

    let mut parts = content.split('/');
    let fingerprint = parts.next().unwrap_or_default();
    if fingerprint.len() != 8 || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(KeyExpressionError::InvalidFingerprint(origin.to_owned()));
    }
    let mut master_fingerprint = [0u8; 4];
    master_fingerprint.copy_from_slice(
        &Vec::<u8>::from_hex(&fingerprint.to_lowercase())
            .map_err(|_| KeyExpressionError::InvalidFingerprint(origin.to_owned()))?,
    );

    let mut derivation = vec![];
    for part in parts {
        if part.is_empty() {
            return Err(KeyExpressionError::TrailingSlashInOrigin(origin.to_owned()));
        }
        if part == "*" {
            return Err(KeyExpressionError::WildcardInOrigin(origin.to_owned()));
        }
        let step = PathStep::from_str(part)
            .map_err(|_| KeyExpressionError::InvalidOriginIndex(origin.to_owned()))?;
        derivation.push(step);
    }

    Ok(KeyOrigin {
        master_fingerprint,
        derivation,
    })
}

/// Parses the derivation path of an extended key expression: the engine's
/// index grammar extended with a terminal children wildcard. Empty
/// segments are tolerated here (unlike in origins).
fn parse_key_path(path: &str) -> Result<Vec<TerminalStep>, KeyExpressionError> {
    let mut steps = vec![];
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if matches!(steps.last(), Some(TerminalStep::Wildcard { .. })) {
            return Err(PathError::InvalidIndexToken(segment.to_owned()).into());
        }
        if let Some(marker) = segment.strip_prefix('*') {
            let hardened = match marker {
                "" => false,
                m if m.len() == 1 && m.starts_with(&HARDENED_MARKERS[..]) => true,
                _ => return Err(PathError::InvalidIndexToken(segment.to_owned()).into()),
            };
            steps.push(TerminalStep::Wildcard { hardened });
            continue;
        }
        steps.push(TerminalStep::Index(PathStep::from_str(segment)?));
    }
    Ok(steps)
}

/// Recognizes a SEC-encoded public key given in hex: 66 chars with prefix
/// `02`/`03` or 130 chars with prefix `04`. Shape only; the point is not
/// checked against the curve.
fn parse_hex_pubkey(key: &str) -> Option<Vec<u8>> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match key.len() {
        66 if key.starts_with("02") || key.starts_with("03") => {
            Vec::<u8>::from_hex(&key.to_lowercase()).ok()
        }
        130 if key.starts_with("04") => Vec::<u8>::from_hex(&key.to_lowercase()).ok(),
        _ => None,
    }
}

/// Recognizes a WIF private key: base58check payload of 33 or 34 bytes
/// carrying the mainnet private key version byte.
fn decode_wif(key: &str) -> Option<Vec<u8>> {
    let payload = base58::from_check(key).ok()?;
    if payload.len() != 33 && payload.len() != 34 {
        return None;
    }
    if payload[0] != WIF_VERSION {
        return None;
    }
    Some(payload)
}
