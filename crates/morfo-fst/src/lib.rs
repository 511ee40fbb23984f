//! HFST-compatible finite-state transducer lookup.
//!
//! This crate loads and executes precompiled morphological transducers:
//! given an input word it enumerates every output string the transducer
//! accepts, together with its weight. It handles the FST extensions real
//! morphologies rely on, notably flag diacritics (runtime feature
//! constraints that prune the search), epsilon transitions, and the
//! identity/unknown wildcard symbols.
//!
//! Two serialization formats are supported: the tab-separated ATT text
//! format produced by `hfst-fst2txt`, and a compact LZMA-compressed
//! binary format that loads considerably faster.
//!
//! # Architecture
//!
//! - [`symbols`] -- Symbol table, classification and input tokenization
//! - [`flags`] -- Flag diacritic parsing and the runtime flag state
//! - [`transducer`] -- Immutable transition store and the public surface
//! - [`format`] -- Tabular and binary codecs
//! - [`lookup`] -- Weighted backtracking lookup engine
//!
//! # Example
//!
//! ```
//! use morfo_fst::{LookupOptions, Transducer};
//!
//! let fst = Transducer::from_tabular_str("0\t1\tk\tk\n1\t2\ta\ta\n2").unwrap();
//! let analyses = fst.lookup("ka", LookupOptions::default()).unwrap();
//! assert_eq!(analyses, vec![("ka".to_string(), 0.0)]);
//! ```
//!
//! A transducer is immutable once loaded; lookups from any number of
//! threads can share one instance without synchronization.

pub mod flags;
pub mod format;
pub mod lookup;
pub mod symbols;
pub mod transducer;

pub use lookup::LookupOptions;
pub use symbols::{SymbolId, SymbolKind, SymbolTable, Token};
pub use transducer::{StateId, Transducer, Transition};

/// Error type for loading a transducer from either serialization format.
///
/// Any load error is fatal: no partial transducer is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Binary data does not start with the `KFST` magic bytes.
    #[error("bad magic bytes at start of binary transducer")]
    BadMagic,
    /// Binary data uses a format version this build does not know.
    #[error("unsupported binary format version {0}")]
    UnsupportedVersion(u16),
    /// Data ended before a complete structure could be read.
    #[error("truncated data: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// A record that does not follow the format. `at` is a 1-based line
    /// number for the tabular format and a byte offset for the binary
    /// format.
    #[error("malformed record at {at}: {reason}")]
    MalformedRecord { at: usize, reason: String },
    /// The symbol section ended before the declared symbol count.
    #[error("symbol section ended before the declared symbol count")]
    SymbolCountMismatch,
    /// A transition references a symbol id outside the symbol table.
    #[error("transition references unknown symbol id {0}")]
    UnknownSymbol(u32),
    /// A symbol carries the `@OP.FEATURE.VALUE@` flag envelope but
    /// violates the flag grammar.
    #[error("malformed flag diacritic: {0:?}")]
    MalformedFlagDiacritic(String),
    /// Error from the underlying reader, passed through unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error type for a single lookup call.
///
/// "No analyses" is not an error; it is an empty result list. A failed
/// lookup never invalidates the transducer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    /// No prefix of the remaining input matches any symbol, and the
    /// transducer has no identity/unknown wildcard to absorb the
    /// character. The payload is the character position.
    #[error("input cannot be tokenized at character {0}")]
    UntokenizableInput(usize),
}
