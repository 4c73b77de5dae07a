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

#[macro_use]
extern crate amplify;

use std::io::{self, BufRead};
use std::process::ExitCode;

use bip380::derive::{self, DeriveError};
use bip380::keyexpr::KeyExpressionError;
use bip380::script::{self, ChecksumMode, ScriptError};
use bip380::{KeyExpr, Secp256k1Provider};
use clap::{Parser, Subcommand};

/// Command-line arguments
#[derive(Parser)]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[clap(
    author,
    version,
    name = "bip380",
    about = "BIP-380 output script descriptor validation tool"
)]
pub struct Args {
    /// Command to execute
    #[clap(subcommand)]
    pub command: Command,
}

/// Descriptor operation to execute
#[derive(Subcommand)]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Command {
    /// Derive BIP32 keys from a hex seed or a serialized extended key
    DeriveKey {
        /// Seed or extended key; use `-` to read values from stdin, one per
        /// line
        value: String,

        /// Derivation path applied to every input value
        #[clap(long)]
        path: Option<String>,
    },

    /// Validate a key expression and echo it back
    KeyExpression {
        /// Key expression; use `-` to read expressions from stdin, one per
        /// line
        expr: String,
    },

    /// Validate a script expression, optionally handling its checksum
    ScriptExpression {
        /// Script expression; use `-` to read expressions from stdin, one
        /// per line
        expr: String,

        /// Require a trailing checksum and verify it, printing `OK`
        #[clap(long, conflicts_with = "compute_checksum")]
        verify_checksum: bool,

        /// Compute the checksum and print the expression with it appended
        #[clap(long)]
        compute_checksum: bool,
    },
}

impl Command {
    fn input(&self) -> &str {
        match self {
            Command::DeriveKey { value, .. } => value,
            Command::KeyExpression { expr } => expr,
            Command::ScriptExpression { expr, .. } => expr,
        }
    }

    fn process(&self, line: &str) -> Result<String, Error> {
        let provider = Secp256k1Provider;
        match self {
            Command::DeriveKey { path, .. } => {
                Ok(derive::derive(&provider, line, path.as_deref())?)
            }
            Command::KeyExpression { .. } => {
                KeyExpr::parse(&provider, line)?;
                Ok(line.to_owned())
            }
            Command::ScriptExpression {
                verify_checksum,
                compute_checksum,
                ..
            } => {
                let mode = if *verify_checksum {
                    ChecksumMode::Verify
                } else if *compute_checksum {
                    ChecksumMode::Compute
                } else {
                    ChecksumMode::Passthrough
                };
                Ok(script::process(&provider, line, mode)?)
            }
        }
    }
}

impl Args {
    /// Runs the selected command on its value, or on each non-empty stdin
    /// line when the value is `-`. A failing line is reported and the
    /// remaining lines are still processed.
    pub fn exec(&self) -> ExitCode {
        if self.command.input() != "-" {
            return match self.command.process(self.command.input()) {
                Ok(out) => {
                    println!("{out}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    ExitCode::FAILURE
                }
            };
        }

        let mut failed = false;
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    eprintln!("Error: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.command.process(line) {
                Ok(out) => println!("{out}"),
                Err(err) => {
                    eprintln!("Error: {err}");
                    failed = true;
                }
            }
        }
        if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum Error {
    #[from]
    Derive(DeriveError),

    #[from]
    Key(KeyExpressionError),

    #[from]
    Script(ScriptError),
}

fn main() -> ExitCode {
    let args = Args::parse();
    args.exec()
}
