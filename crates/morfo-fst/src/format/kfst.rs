// Binary codec. Little-endian throughout.
//
// Layout: `KFST` magic, u16 version, u16 symbol count, u32 state count,
// u32 final-state count, u8 weighted flag, the symbols as NUL-terminated
// UTF-8 strings in id order, then a single LZMA stream holding the
// transition records followed by the final-state records.
//
// The transition count is not stored. The decoder subtracts the
// final-state region from the decompressed payload and requires the
// remainder to divide evenly into transition records.

use indexmap::IndexMap;

use crate::symbols::SymbolTable;
use crate::transducer::{StateId, Transducer, Transition};
use crate::ParseError;

const MAGIC: &[u8; 4] = b"KFST";
const VERSION: u16 = 0;

/// Size of the fixed-width header fields, magic included.
pub const HEADER_SIZE: usize = 17;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(ParseError::Truncated {
                expected: end,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f64(&mut self) -> Result<f64, ParseError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    /// Read a NUL-terminated UTF-8 string from the symbol section.
    fn read_symbol(&mut self) -> Result<&'a str, ParseError> {
        let rest = &self.data[self.pos..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            // Ran off the end of the data before the declared number of
            // symbols was read.
            return Err(ParseError::SymbolCountMismatch);
        };
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| ParseError::MalformedRecord {
            at: self.pos,
            reason: "symbol is not valid UTF-8".to_string(),
        })?;
        self.pos += nul + 1;
        Ok(text)
    }
}

pub(crate) fn decode(data: &[u8]) -> Result<Transducer, ParseError> {
    let mut cursor = Cursor::new(data);

    if cursor.take(4)? != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let version = cursor.read_u16()?;
    if version != VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }
    let symbol_count = cursor.read_u16()?;
    let state_count = cursor.read_u32()?;
    let final_count = cursor.read_u32()? as usize;
    let weighted = cursor.read_u8()? != 0;

    let mut symbols = SymbolTable::new();
    for index in 0..symbol_count {
        let text = cursor.read_symbol()?;
        let id = symbols.push(text)?;
        if id != index {
            return Err(ParseError::MalformedRecord {
                at: cursor.pos,
                reason: format!("duplicate symbol {text:?} in symbol section"),
            });
        }
    }

    let mut compressed = &data[cursor.pos..];
    let mut payload = Vec::new();
    lzma_rs::lzma_decompress(&mut compressed, &mut payload).map_err(|err| {
        ParseError::MalformedRecord {
            at: cursor.pos,
            reason: format!("cannot decompress payload: {err:?}"),
        }
    })?;

    let final_size = if weighted { 12 } else { 4 };
    let transition_size = if weighted { 20 } else { 12 };
    let final_bytes = final_count * final_size;
    let transition_bytes =
        payload
            .len()
            .checked_sub(final_bytes)
            .ok_or(ParseError::Truncated {
                expected: final_bytes,
                actual: payload.len(),
            })?;
    if transition_bytes % transition_size != 0 {
        return Err(ParseError::Truncated {
            expected: final_bytes + transition_bytes.next_multiple_of(transition_size),
            actual: payload.len(),
        });
    }
    let transition_count = transition_bytes / transition_size;

    let mut cursor = Cursor::new(&payload);
    let mut records = Vec::with_capacity(transition_count);
    for _ in 0..transition_count {
        let src = cursor.read_u32()?;
        let dst = cursor.read_u32()?;
        let input = cursor.read_u16()?;
        let output = cursor.read_u16()?;
        let weight = if weighted { cursor.read_f64()? } else { 0.0 };
        if src >= state_count || dst >= state_count {
            return Err(ParseError::MalformedRecord {
                at: cursor.pos,
                reason: "transition references a state beyond the declared state count"
                    .to_string(),
            });
        }
        if input >= symbol_count {
            return Err(ParseError::UnknownSymbol(u32::from(input)));
        }
        if output >= symbol_count {
            return Err(ParseError::UnknownSymbol(u32::from(output)));
        }
        records.push((
            src,
            Transition {
                to: dst,
                input,
                output,
                weight,
            },
        ));
    }

    let mut final_weights: IndexMap<StateId, f64> = IndexMap::with_capacity(final_count);
    for _ in 0..final_count {
        let state = cursor.read_u32()?;
        let weight = if weighted { cursor.read_f64()? } else { 0.0 };
        if state >= state_count {
            return Err(ParseError::MalformedRecord {
                at: cursor.pos,
                reason: "final state beyond the declared state count".to_string(),
            });
        }
        final_weights.insert(state, weight);
    }

    Ok(Transducer::assemble(
        symbols,
        records,
        final_weights,
        weighted,
        state_count,
    ))
}

pub(crate) fn encode(fst: &Transducer) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(fst.symbols.len() as u16).to_le_bytes());
    out.extend_from_slice(&fst.state_count().to_le_bytes());
    out.extend_from_slice(&(fst.final_weights.len() as u32).to_le_bytes());
    out.push(u8::from(fst.weighted));

    for text in fst.symbols.texts() {
        out.extend_from_slice(text.as_bytes());
        out.push(0);
    }

    let mut payload = Vec::new();
    for state in 0..fst.state_count() {
        for transition in fst.transitions_from(state) {
            payload.extend_from_slice(&state.to_le_bytes());
            payload.extend_from_slice(&transition.to.to_le_bytes());
            payload.extend_from_slice(&transition.input.to_le_bytes());
            payload.extend_from_slice(&transition.output.to_le_bytes());
            if fst.weighted {
                payload.extend_from_slice(&transition.weight.to_le_bytes());
            }
        }
    }
    for (&state, &weight) in &fst.final_weights {
        payload.extend_from_slice(&state.to_le_bytes());
        if fst.weighted {
            payload.extend_from_slice(&weight.to_le_bytes());
        }
    }

    lzma_rs::lzma_compress(&mut payload.as_slice(), &mut out)?;
    Ok(out)
}
