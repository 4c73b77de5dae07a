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

//! Derivation path micro-language: normalization, index parsing and
//! step-by-step application of child derivation through a provider.

use std::fmt::{self, Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use crate::provider::{DerivationProvider, ProviderError, XKey};
use crate::HARDENED_INDEX_BOUNDARY;

/// Maximum number of path segments accepted by the engine; a guard against
/// unbounded derivation chains fed from untrusted input.
pub const MAX_DERIVATION_DEPTH: usize = 10;

/// Hardened markers recognized on input; `'` is the canonical one.
pub(crate) const HARDENED_MARKERS: [char; 3] = ['h', 'H', '\''];

/// Errors of derivation path parsing and application.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PathError {
    /// derivation path cannot be empty or contain only slashes
    EmptyOrSlashesOnly,

    /// derivation path cannot end with a trailing slash
    TrailingSlash,

    /// derivation path depth {0} exceeds the maximum of 10 levels
    DepthExceeded(usize),

    /// derivation index `{0}` is out of range [0, 2^31-1]
    IndexOutOfRange(String),

    /// invalid derivation index `{0}`
    InvalidIndexToken(String),

    /// derivation path must contain at least one valid index
    NoValidIndex,

    /// child derivation failed: {0}
    #[from]
    Derivation(ProviderError),
}

/// Single derivation path step: a 31-bit index plus hardened marker.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct PathStep {
    /// Zero-based index, always below [`HARDENED_INDEX_BOUNDARY`].
    pub index: u32,
    /// Whether this step uses hardened derivation.
    pub hardened: bool,
}

impl PathStep {
    /// Raw value passed to child derivation; hardened steps are offset by
    /// [`HARDENED_INDEX_BOUNDARY`].
    pub fn derivation_value(self) -> u32 {
        if self.hardened {
            self.index + HARDENED_INDEX_BOUNDARY
        } else {
            self.index
        }
    }
}

impl Display for PathStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.index, f)?;
        if self.hardened {
            f.write_str("'")?;
        }
        Ok(())
    }
}

impl FromStr for PathStep {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, hardened) = match s.strip_suffix(&HARDENED_MARKERS[..]) {
            Some(num) => (num, true),
            None => (s, false),
        };
        if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::InvalidIndexToken(s.to_owned()));
        }
        let index = u64::from_str(num).map_err(|_| PathError::IndexOutOfRange(s.to_owned()))?;
        if index >= HARDENED_INDEX_BOUNDARY as u64 {
            return Err(PathError::IndexOutOfRange(s.to_owned()));
        }
        Ok(PathStep {
            index: index as u32,
            hardened,
        })
    }
}

/// Validated derivation path holding at least one step.
///
/// Parsing normalizes the textual form first: a leading `/` is prepended
/// when absent and `h`/`H` hardened markers are rewritten to `'`. Empty
/// segments between separators are skipped.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, From)]
pub struct DerivationSubpath(Vec<PathStep>);

impl Deref for DerivationSubpath {
    type Target = [PathStep];

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl Display for DerivationSubpath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            f.write_str("/")?;
            Display::fmt(step, f)?;
        }
        Ok(())
    }
}

impl FromStr for DerivationSubpath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        if normalized == "/" || normalized == "//" {
            return Err(PathError::EmptyOrSlashesOnly);
        }
        if normalized.ends_with('/') {
            return Err(PathError::TrailingSlash);
        }
        let segments: Vec<&str> = normalized[1..].split('/').collect();
        if segments.len() > MAX_DERIVATION_DEPTH {
            return Err(PathError::DepthExceeded(segments.len()));
        }
        let steps = segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .map(PathStep::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(PathError::NoValidIndex);
        }
        Ok(DerivationSubpath(steps))
    }
}

impl DerivationSubpath {
    /// Applies the path to a key, deriving one child per step through the
    /// provider.
    pub fn derive<P: DerivationProvider>(
        &self,
        provider: &P,
        key: XKey,
    ) -> Result<XKey, PathError> {
        let mut key = key;
        for step in &self.0 {
            key = provider.derive_child(&key, step.derivation_value())?;
        }
        Ok(key)
    }
}

/// Rewrites a path string into canonical form: leading `/`, hardened
/// markers as `'`.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    for c in path.chars() {
        normalized.push(match c {
            'h' | 'H' => '\'',
            other => other,
        });
    }
    normalized
}
