// Tabular (ATT) codec: one tab-separated record per line.
//
// 1 or 2 fields is a final-state record (`state` / `state <TAB> weight`),
// 4 or 5 fields is a transition (`src dst in out [weight]`). Blank lines
// separate multiple transducers in one file; only the first is built, the
// rest are parsed for validity and discarded.

use indexmap::IndexMap;

use crate::symbols::{SymbolTable, EPSILON_ALIAS, EPSILON_TEXT};
use crate::transducer::{StateId, Transducer, Transition};
use crate::ParseError;

fn malformed(line: usize, reason: impl Into<String>) -> ParseError {
    ParseError::MalformedRecord {
        at: line,
        reason: reason.into(),
    }
}

fn parse_state(field: &str, line: usize) -> Result<StateId, ParseError> {
    field
        .parse::<StateId>()
        .map_err(|_| malformed(line, format!("invalid state id {field:?}")))
}

fn parse_weight(field: &str, line: usize) -> Result<f64, ParseError> {
    field
        .parse::<f64>()
        .map_err(|_| malformed(line, format!("invalid weight {field:?}")))
}

fn check_symbol(field: &str, line: usize) -> Result<(), ParseError> {
    if field.is_empty() {
        return Err(malformed(line, "empty symbol field"));
    }
    Ok(())
}

/// Both spellings of epsilon map to the canonical `@0@` entry.
fn canonical(text: &str) -> &str {
    if text == EPSILON_ALIAS {
        EPSILON_TEXT
    } else {
        text
    }
}

pub(crate) fn decode(code: &str) -> Result<Transducer, ParseError> {
    let mut symbols = SymbolTable::new();
    // Epsilon takes id 0 by convention, whether or not the file uses it.
    symbols.push(EPSILON_TEXT)?;

    let mut records: Vec<(StateId, Transition)> = Vec::new();
    let mut final_weights: IndexMap<StateId, f64> = IndexMap::new();
    let mut weighted = false;
    let mut section = 0usize;

    for (index, line) in code.lines().enumerate() {
        let line_no = index + 1;
        if line.is_empty() {
            section += 1;
            continue;
        }
        let building = section == 0;
        let fields: Vec<&str> = line.split('\t').collect();
        match fields.as_slice() {
            [state] => {
                let state = parse_state(state, line_no)?;
                if building {
                    final_weights.insert(state, 0.0);
                }
            }
            [state, weight] => {
                let state = parse_state(state, line_no)?;
                let weight = parse_weight(weight, line_no)?;
                if building {
                    final_weights.insert(state, weight);
                    weighted = true;
                }
            }
            [src, dst, input, output] => {
                let src = parse_state(src, line_no)?;
                let dst = parse_state(dst, line_no)?;
                check_symbol(input, line_no)?;
                check_symbol(output, line_no)?;
                if building {
                    let input = symbols.push(canonical(input))?;
                    let output = symbols.push(canonical(output))?;
                    records.push((
                        src,
                        Transition {
                            to: dst,
                            input,
                            output,
                            weight: 0.0,
                        },
                    ));
                }
            }
            [src, dst, input, output, weight] => {
                let src = parse_state(src, line_no)?;
                let dst = parse_state(dst, line_no)?;
                check_symbol(input, line_no)?;
                check_symbol(output, line_no)?;
                let weight = parse_weight(weight, line_no)?;
                if building {
                    let input = symbols.push(canonical(input))?;
                    let output = symbols.push(canonical(output))?;
                    records.push((
                        src,
                        Transition {
                            to: dst,
                            input,
                            output,
                            weight,
                        },
                    ));
                    weighted = true;
                }
            }
            _ => {
                return Err(malformed(
                    line_no,
                    format!("expected 1, 2, 4 or 5 tab-separated fields, got {}", fields.len()),
                ));
            }
        }
    }

    Ok(Transducer::assemble(
        symbols,
        records,
        final_weights,
        weighted,
        0,
    ))
}

pub(crate) fn encode(fst: &Transducer) -> String {
    let mut rows: Vec<String> = Vec::new();
    for (&state, &weight) in &fst.final_weights {
        if weight == 0.0 {
            rows.push(state.to_string());
        } else {
            rows.push(format!("{state}\t{weight}"));
        }
    }
    for state in 0..fst.state_count() {
        for transition in fst.transitions_from(state) {
            let input = fst.symbols.text_of(transition.input);
            let output = fst.symbols.text_of(transition.output);
            if transition.weight == 0.0 {
                rows.push(format!("{state}\t{}\t{input}\t{output}", transition.to));
            } else {
                rows.push(format!(
                    "{state}\t{}\t{input}\t{output}\t{}",
                    transition.to, transition.weight
                ));
            }
        }
    }
    rows.join("\n")
}
