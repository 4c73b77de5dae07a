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

//! Descriptor checksum codec: a BCH-style error-detecting code over GF(32)
//! appended to descriptor strings after a `#` separator (BIP-380).

/// Character set of symbols which may appear in a descriptor script body.
///
/// The position of each character is load-bearing: the low 5 bits of the
/// position become a checksum symbol and the high 3 bits feed the grouping
/// counter. Must be reproduced verbatim.
pub const INPUT_CHARSET: &str = "0123456789()[],'/*abcdefgh@:$%{}IJKLMNOPQRSTUVWXYZ&+-.;<=>?!^_|~ijklmnopqrstuvwxyzABCDEFGH`#\"\\ ";

/// Alphabet used for rendering the 8 checksum symbols, shared with other
/// bech32-style encodings.
pub const CHECKSUM_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Length of a descriptor checksum in characters.
pub const CHECKSUM_LEN: usize = 8;

/// Generator constants of the 35-bit polynomial defining the code.
const GENERATOR: [u64; 5] = [
    0xf5dee51989,
    0xa9fdca3312,
    0x1bab10e32d,
    0x3706b1677a,
    0x644d626ffd,
];

/// Errors produced by the checksum codec.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ChecksumError {
    /// invalid character `{0}` in script
    InvalidCharacter(char),
}

/// Expands a script string into the 5-bit symbol stream fed to [`polymod`].
///
/// Each character contributes its charset position's low 5 bits directly;
/// high 3 bits are packed base-27 in groups of three characters, with a
/// partial group flushed at the end of input.
fn expand(script: &str) -> Result<Vec<u8>, ChecksumError> {
    let mut symbols = Vec::with_capacity(script.len() + script.len() / 3 + 1);
    let mut groups = Vec::with_capacity(3);
    for c in script.chars() {
        let v = INPUT_CHARSET
            .find(c)
            .ok_or(ChecksumError::InvalidCharacter(c))? as u8;
        symbols.push(v & 31);
        groups.push(v >> 5);
        if groups.len() == 3 {
            symbols.push(groups[0] * 9 + groups[1] * 3 + groups[2]);
            groups.clear();
        }
    }
    match groups[..] {
        [g0] => symbols.push(g0),
        [g0, g1] => symbols.push(g0 * 3 + g1),
        _ => {}
    }
    Ok(symbols)
}

/// Rolling GF(32) polynomial residue with a 35-bit state seeded to 1.
///
/// Residue 1 over a full symbol stream (script expansion plus checksum
/// symbols) denotes a valid codeword.
fn polymod(symbols: impl IntoIterator<Item = u8>) -> u64 {
    let mut chk = 1u64;
    for value in symbols {
        let top = chk >> 35;
        chk = ((chk & 0x7ffffffff) << 5) ^ value as u64;
        for (bit, generator) in GENERATOR.iter().enumerate() {
            if (top >> bit) & 1 != 0 {
                chk ^= generator;
            }
        }
    }
    chk
}

/// Checks a claimed checksum against a script body.
///
/// Returns `Ok(false)` both on a residue mismatch and when the claimed
/// checksum contains characters outside [`CHECKSUM_CHARSET`]; length and
/// alphabet diagnostics with distinct messages are the caller's business.
pub fn verify(script: &str, checksum: &str) -> Result<bool, ChecksumError> {
    let mut symbols = expand(script)?;
    for c in checksum.chars() {
        match CHECKSUM_CHARSET.find(c) {
            Some(v) => symbols.push(v as u8),
            None => return Ok(false),
        }
    }
    Ok(polymod(symbols) == 1)
}

/// Computes the 8-character checksum for a script body.
pub fn compute(script: &str) -> Result<String, ChecksumError> {
    let mut symbols = expand(script)?;
    symbols.extend([0u8; CHECKSUM_LEN]);
    let residue = polymod(symbols) ^ 1;
    let alphabet = CHECKSUM_CHARSET.as_bytes();
    Ok((0..CHECKSUM_LEN)
        .map(|i| {
            let value = (residue >> (5 * (7 - i))) & 31;
            alphabet[value as usize] as char
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn charset_sizes() {
        assert_eq!(INPUT_CHARSET.len(), 92);
        assert_eq!(CHECKSUM_CHARSET.len(), 32);
    }

    #[test]
    fn raw_deadbeef_vector() {
        assert_eq!(compute("raw(deadbeef)").unwrap(), "89f8spxm");
        assert!(verify("raw(deadbeef)", "89f8spxm").unwrap());
    }

    #[test]
    fn round_trip() {
        for script in [
            "raw(deadbeef)",
            "pk(0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2)",
            "sh(multi(2,A,B,C))",
            "pkh([deadbeef/0h/1]xpub6ERApfZwUNrhLCkDtcHTcxd75RbzS1ed54G1LkBUBQVHcxxKyeD)",
        ] {
            let checksum = compute(script).unwrap();
            assert_eq!(checksum.len(), CHECKSUM_LEN);
            assert!(verify(script, &checksum).unwrap());
        }
    }

    #[test]
    fn single_flip_detected() {
        let script = "raw(deadbeef)";
        let checksum = compute(script).unwrap();
        // Any single-character substitution in the script body must change
        // the residue.
        for pos in 0..script.len() {
            for replacement in ['0', 'q', 'x'] {
                let mut mutated: Vec<char> = script.chars().collect();
                if mutated[pos] == replacement {
                    continue;
                }
                mutated[pos] = replacement;
                let mutated: String = mutated.into_iter().collect();
                assert!(!verify(&mutated, &checksum).unwrap());
            }
        }
        // Same for the checksum itself.
        for pos in 0..checksum.len() {
            for replacement in CHECKSUM_CHARSET.chars().take(4) {
                let mut mutated: Vec<char> = checksum.chars().collect();
                if mutated[pos] == replacement {
                    continue;
                }
                mutated[pos] = replacement;
                let mutated: String = mutated.into_iter().collect();
                assert!(!verify(script, &mutated).unwrap());
            }
        }
    }

    #[test]
    fn foreign_character_rejected() {
        assert_eq!(
            compute("raw(dead\u{e9}beef)"),
            Err(ChecksumError::InvalidCharacter('\u{e9}'))
        );
        assert_eq!(
            verify("raw(\nbeef)", "89f8spxm"),
            Err(ChecksumError::InvalidCharacter('\n'))
        );
    }

    #[test]
    fn wrong_alphabet_is_invalid_not_error() {
        assert_eq!(verify("raw(deadbeef)", "89f8spxB"), Ok(false));
    }
}
