// Immutable transducer store: states, grouped transitions, final-state
// weights, and the public loading/lookup surface.

use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;

use crate::format::{att, kfst};
use crate::lookup::{self, LookupOptions};
use crate::symbols::{SymbolId, SymbolTable, Token};
use crate::{LookupError, ParseError};

/// Dense state identifier. State 0 is the start state.
pub type StateId = u32;

/// One outgoing transition. The source state is implicit: transitions are
/// stored grouped by source state, in source-file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub to: StateId,
    pub input: SymbolId,
    pub output: SymbolId,
    /// 0.0 throughout for unweighted transducers.
    pub weight: f64,
}

/// A loaded finite-state transducer.
///
/// The value is immutable after construction, so any number of threads
/// may run lookups against the same instance without synchronization.
#[derive(Debug)]
pub struct Transducer {
    pub(crate) symbols: SymbolTable,
    /// All transitions, grouped by source state.
    pub(crate) transitions: Vec<Transition>,
    /// `offsets[s]..offsets[s + 1]` bounds state `s`'s block in
    /// `transitions`; one sentinel entry at the end.
    pub(crate) offsets: Vec<u32>,
    /// Final states and their acceptance weights, in load order.
    pub(crate) final_weights: IndexMap<StateId, f64>,
    pub(crate) weighted: bool,
}

impl Transducer {
    /// Assemble a transducer from loose parts.
    ///
    /// `records` are `(source, transition)` pairs in file order; their
    /// in-state order is preserved. The state space covers every
    /// referenced state and at least `min_states` states (the binary
    /// codec passes the declared state count so that states without
    /// transitions survive a round-trip).
    pub(crate) fn assemble(
        symbols: SymbolTable,
        records: Vec<(StateId, Transition)>,
        final_weights: IndexMap<StateId, f64>,
        weighted: bool,
        min_states: StateId,
    ) -> Self {
        let mut states = u64::from(min_states).max(1);
        for &(src, ref transition) in &records {
            states = states
                .max(u64::from(src) + 1)
                .max(u64::from(transition.to) + 1);
        }
        for &state in final_weights.keys() {
            states = states.max(u64::from(state) + 1);
        }
        let states = states as usize;

        // Counting sort by source state keeps each state's transitions in
        // their original relative order.
        let mut offsets = vec![0u32; states + 1];
        for &(src, _) in &records {
            offsets[src as usize + 1] += 1;
        }
        for state in 0..states {
            offsets[state + 1] += offsets[state];
        }
        let mut cursor: Vec<u32> = offsets[..states].to_vec();
        let mut transitions = vec![
            Transition {
                to: 0,
                input: 0,
                output: 0,
                weight: 0.0,
            };
            records.len()
        ];
        for (src, transition) in records {
            let slot = cursor[src as usize] as usize;
            transitions[slot] = transition;
            cursor[src as usize] += 1;
        }

        Transducer {
            symbols,
            transitions,
            offsets,
            final_weights,
            weighted,
        }
    }

    /// The symbol table backing this transducer.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Number of states, including states with no outgoing transitions.
    pub fn state_count(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    /// Total number of transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// The start state. Always 0.
    pub fn start_state(&self) -> StateId {
        0
    }

    /// Outgoing transitions of `state`, in source-file order.
    pub fn transitions_from(&self, state: StateId) -> &[Transition] {
        let lo = self.offsets[state as usize] as usize;
        let hi = self.offsets[state as usize + 1] as usize;
        &self.transitions[lo..hi]
    }

    /// Acceptance weight of `state`, or `None` if it is not final.
    pub fn final_weight(&self, state: StateId) -> Option<f64> {
        self.final_weights.get(&state).copied()
    }

    /// Whether the transducer carries meaningful weights.
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Load a transducer from tabular text read from `reader`.
    pub fn from_tabular<R: Read>(mut reader: R) -> Result<Self, ParseError> {
        let mut code = String::new();
        reader.read_to_string(&mut code)?;
        att::decode(&code)
    }

    /// Load a transducer from tabular text already in memory.
    pub fn from_tabular_str(code: &str) -> Result<Self, ParseError> {
        att::decode(code)
    }

    /// Load a transducer from a tabular file on disk.
    pub fn from_tabular_path(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let code = std::fs::read_to_string(path)?;
        att::decode(&code)
    }

    /// Load a transducer from binary data read from `reader`.
    pub fn from_binary<R: Read>(mut reader: R) -> Result<Self, ParseError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        kfst::decode(&data)
    }

    /// Load a transducer from binary data already in memory.
    pub fn from_binary_bytes(data: &[u8]) -> Result<Self, ParseError> {
        kfst::decode(data)
    }

    /// Load a transducer from a binary file on disk.
    pub fn from_binary_path(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let data = std::fs::read(path)?;
        kfst::decode(&data)
    }

    /// Serialize to the binary format.
    pub fn to_binary<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let bytes = kfst::encode(self)?;
        writer.write_all(&bytes)
    }

    /// Serialize to the binary format, returning the bytes.
    pub fn to_binary_bytes(&self) -> std::io::Result<Vec<u8>> {
        kfst::encode(self)
    }

    /// Serialize to the binary format at `path`.
    pub fn to_binary_path(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, kfst::encode(self)?)
    }

    /// Serialize to tabular text.
    pub fn to_tabular(&self) -> String {
        att::encode(self)
    }

    /// Segment `input` against the symbol table, longest match first.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LookupError> {
        self.symbols.tokenize(input)
    }

    /// Tokenize and transduce `input`.
    ///
    /// Returns every accepted `(output, weight)` pair, sorted ascending
    /// by weight with duplicates removed. No analyses is not an error:
    /// the result is simply empty.
    pub fn lookup(
        &self,
        input: &str,
        options: LookupOptions,
    ) -> Result<Vec<(String, f64)>, LookupError> {
        lookup::run(self, input, options)
    }
}
