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

//! Script expression validation and checksum orchestration.
//!
//! Exactly six surface forms are recognized, each matched as a fixed
//! template by explicit ordered attempts (`sh(...)` unwrapping checked
//! before bare forms): `pk(K)`, `pkh(K)`, `multi(k,K1,...,Kn)`,
//! `sh(pk|pkh|multi)` and `raw(HEX)`.

use bitcoin::hashes::hex::FromHex;

use crate::checksum::{self, ChecksumError, CHECKSUM_CHARSET, CHECKSUM_LEN};
use crate::keyexpr::{KeyExpr, KeyExpressionError};
use crate::provider::DerivationProvider;

/// Errors of script expression validation and checksum processing.
///
/// The three checksum shape errors (too short, too long, wrong alphabet)
/// are deliberately distinct kinds: their wording is part of the external
/// contract.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ScriptError {
    /// {0} (no checksum present)
    ChecksumRequired(String),

    /// {0} (missing checksum)
    ChecksumMissing(String),

    /// too short checksum ({0} chars): must be 8 characters from qpzry9x8gf2tvdw0s3jn54khce6mua7l
    ChecksumTooShort(usize),

    /// too long checksum ({0} chars): must be 8 characters from qpzry9x8gf2tvdw0s3jn54khce6mua7l
    ChecksumTooLong(usize),

    /// invalid checksum format: must be 8 characters from qpzry9x8gf2tvdw0s3jn54khce6mua7l
    ChecksumCharset,

    /// error in payload: {0}
    ChecksumMismatch(String),

    /// {0} (invalid script expression format)
    InvalidFormat(String),

    /// {0} (invalid k in multi: must be 0 < k <= n)
    InvalidMultiK(String),

    /// {0} (invalid characters in payload)
    InvalidHexPayload(String),

    /// {0}
    #[from]
    Checksum(ChecksumError),

    /// {0}
    #[from]
    Key(KeyExpressionError),
}

/// Validated script expression template.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ScriptExpr {
    /// `pk(KEY)`
    Pk(KeyExpr),
    /// `pkh(KEY)`
    Pkh(KeyExpr),
    /// `multi(k,KEY1,...,KEYn)`
    Multi {
        /// Number of required signatures; `0 < threshold <= keys.len()`.
        threshold: u32,
        /// Keys participating in the multisig, in order.
        keys: Vec<KeyExpr>,
    },
    /// `sh(...)`; the parser only ever wraps `Pk`, `Pkh` or `Multi` here.
    Sh(Box<ScriptExpr>),
    /// `raw(HEX)` with the payload hex decoded.
    Raw(Vec<u8>),
}

impl ScriptExpr {
    /// Validates a script body (the part before `#`), recursing into
    /// embedded key expressions.
    pub fn parse<P: DerivationProvider>(
        provider: &P,
        script: &str,
    ) -> Result<ScriptExpr, ScriptError> {
        let trimmed = normalize_spacing(script);
        if let Some(inner) = unwrap_form("sh", &trimmed) {
            let inner = parse_unhashed(provider, inner, script)?;
            return Ok(ScriptExpr::Sh(Box::new(inner)));
        }
        if let Some(content) = unwrap_form("raw", &trimmed) {
            if !content.chars().all(|c| c == ' ' || c.is_ascii_hexdigit()) {
                return Err(ScriptError::InvalidFormat(script.to_owned()));
            }
            let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Err(ScriptError::InvalidHexPayload(script.to_owned()));
            }
            let payload = Vec::<u8>::from_hex(&cleaned.to_lowercase())
                .map_err(|_| ScriptError::InvalidHexPayload(script.to_owned()))?;
            return Ok(ScriptExpr::Raw(payload));
        }
        parse_unhashed(provider, &trimmed, script)
    }
}

/// Parses the forms valid both bare and under `sh(...)`: `pk`, `pkh`,
/// `multi`.
fn parse_unhashed<P: DerivationProvider>(
    provider: &P,
    content: &str,
    script: &str,
) -> Result<ScriptExpr, ScriptError> {
    if let Some(key) = unwrap_form("pk", content) {
        return Ok(ScriptExpr::Pk(parse_single_key(provider, key, script)?));
    }
    if let Some(key) = unwrap_form("pkh", content) {
        return Ok(ScriptExpr::Pkh(parse_single_key(provider, key, script)?));
    }
    if let Some(args) = unwrap_form("multi", content) {
        return parse_multi(provider, args, script);
    }
    Err(ScriptError::InvalidFormat(script.to_owned()))
}

fn parse_single_key<P: DerivationProvider>(
    provider: &P,
    key: &str,
    script: &str,
) -> Result<KeyExpr, ScriptError> {
    if key.contains(')') {
        return Err(ScriptError::InvalidFormat(script.to_owned()));
    }
    Ok(KeyExpr::parse(provider, key.trim())?)
}

fn parse_multi<P: DerivationProvider>(
    provider: &P,
    args: &str,
    script: &str,
) -> Result<ScriptExpr, ScriptError> {
    if args.contains(')') {
        return Err(ScriptError::InvalidFormat(script.to_owned()));
    }
    let (threshold, keys) = args
        .split_once(',')
        .ok_or_else(|| ScriptError::InvalidFormat(script.to_owned()))?;
    if threshold.is_empty() || !threshold.bytes().all(|b| b.is_ascii_digit()) || keys.is_empty() {
        return Err(ScriptError::InvalidFormat(script.to_owned()));
    }
    let threshold: u32 = threshold
        .parse()
        .map_err(|_| ScriptError::InvalidMultiK(script.to_owned()))?;
    let keys = keys
        .split(',')
        .map(|key| KeyExpr::parse(provider, key.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    if threshold == 0 || threshold as usize > keys.len() {
        return Err(ScriptError::InvalidMultiK(script.to_owned()));
    }
    Ok(ScriptExpr::Multi { threshold, keys })
}

/// Strips `name(` and the trailing `)`, requiring non-empty content.
fn unwrap_form<'s>(name: &str, script: &'s str) -> Option<&'s str> {
    script
        .strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
        .filter(|content| !content.is_empty())
}

/// Collapses runs of spaces and tabs into single spaces and trims the
/// ends, leaving the template matchable while tolerating caller spacing.
fn normalize_spacing(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut pending_space = false;
    for c in script.chars() {
        if c == ' ' || c == '\t' {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Checksum handling policy of [`process`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ChecksumMode {
    /// Require and verify a trailing checksum; answer `OK`.
    Verify,
    /// Compute the checksum and echo `script#checksum`.
    Compute,
    /// Echo the input verbatim, verifying a checksum only when present.
    Passthrough,
}

/// Top-level script expression operation: splits off an optional `#`
/// checksum, validates the script body and applies the checksum policy.
///
/// All three modes share one validate-then-branch pipeline so the
/// checksum shape checks can never be skipped in any mode.
pub fn process<P: DerivationProvider>(
    provider: &P,
    expr: &str,
    mode: ChecksumMode,
) -> Result<String, ScriptError> {
    let (script, checksum) = match expr.split_once('#') {
        Some((script, checksum)) => (script, Some(checksum)),
        None => (expr, None),
    };

    match mode {
        ChecksumMode::Verify => {
            let checksum = checksum.ok_or_else(|| ScriptError::ChecksumRequired(expr.to_owned()))?;
            if checksum.is_empty() {
                return Err(ScriptError::ChecksumMissing(expr.to_owned()));
            }
            check_checksum_shape(checksum)?;
            ScriptExpr::parse(provider, script)?;
            if !checksum::verify(script, checksum)? {
                return Err(ScriptError::ChecksumMismatch(expr.to_owned()));
            }
            Ok("OK".to_owned())
        }
        ChecksumMode::Compute => {
            // A caller-supplied checksum is ignored; the answer is always
            // recomputed from the script body.
            ScriptExpr::parse(provider, script)?;
            let checksum = checksum::compute(script)?;
            Ok(format!("{script}#{checksum}"))
        }
        ChecksumMode::Passthrough => {
            if let Some(checksum) = checksum {
                check_checksum_shape(checksum)?;
                ScriptExpr::parse(provider, script)?;
                if !checksum::verify(script, checksum)? {
                    return Err(ScriptError::ChecksumMismatch(expr.to_owned()));
                }
            } else {
                ScriptExpr::parse(provider, script)?;
            }
            Ok(expr.to_owned())
        }
    }
}

/// Shape guard shared by all modes handling a present checksum: length
/// first (with distinct too-short/too-long kinds), alphabet second.
fn check_checksum_shape(checksum: &str) -> Result<(), ScriptError> {
    let len = checksum.chars().count();
    if len < CHECKSUM_LEN {
        return Err(ScriptError::ChecksumTooShort(len));
    }
    if len > CHECKSUM_LEN {
        return Err(ScriptError::ChecksumTooLong(len));
    }
    if !checksum.chars().all(|c| CHECKSUM_CHARSET.contains(c)) {
        return Err(ScriptError::ChecksumCharset);
    }
    Ok(())
}
