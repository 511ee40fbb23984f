// Serialization formats for transducers.
//
// - [`att`] -- the line-oriented tabular text format
// - [`kfst`] -- the compressed binary format

pub mod att;
pub mod kfst;
