// Weighted backtracking lookup over a loaded transducer.
//
// The search runs on an explicit work stack of path configurations
// instead of recursing, so deep transducers cannot overflow the call
// stack. Successors are pushed in reverse so each state's transitions
// are explored in source-file order.

use im::HashSet;

use crate::flags::FlagState;
use crate::symbols::{SymbolId, SymbolKind, Token};
use crate::transducer::{StateId, Transducer, Transition};
use crate::LookupError;

/// Options for [`Transducer::lookup`].
#[derive(Debug, Clone, Copy)]
pub struct LookupOptions {
    /// State to begin the search in.
    pub start_state: StateId,
    /// Strip flag diacritic symbols from the returned outputs. Turning
    /// this off keeps them verbatim, which helps when debugging a
    /// morphology.
    pub post_process: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            start_state: 0,
            post_process: true,
        }
    }
}

/// One element of a path's output tape.
#[derive(Debug, Clone, Copy)]
enum OutItem {
    /// An output symbol from the table.
    Sym(SymbolId),
    /// A character copied through an identity/unknown wildcard.
    Verbatim(char),
}

/// A pending search configuration. Cloned wholesale at branch points;
/// the flag state and visited set share structure with the parent path.
struct Frame {
    state: StateId,
    pos: usize,
    flags: FlagState,
    /// Configurations reached since the last consumed token. Stepping
    /// into a member again would close a pure epsilon cycle, so that
    /// branch is pruned.
    visited: HashSet<(StateId, FlagState)>,
    output: Vec<OutItem>,
    weight: f64,
}

pub(crate) fn run(
    fst: &Transducer,
    input: &str,
    options: LookupOptions,
) -> Result<Vec<(String, f64)>, LookupError> {
    let tokens = fst.symbols().tokenize(input)?;
    let mut results: Vec<(String, f64)> = Vec::new();
    if options.start_state >= fst.state_count() {
        return Ok(results);
    }

    let start_flags = FlagState::new();
    let mut stack = vec![Frame {
        state: options.start_state,
        pos: 0,
        visited: HashSet::unit((options.start_state, start_flags.clone())),
        flags: start_flags,
        output: Vec::new(),
        weight: 0.0,
    }];

    while let Some(frame) = stack.pop() {
        if frame.pos == tokens.len() {
            if let Some(final_weight) = fst.final_weight(frame.state) {
                results.push((
                    render(fst, &frame.output, options.post_process),
                    frame.weight + final_weight,
                ));
            }
        }
        let token = tokens.get(frame.pos).copied();
        let transitions = fst.transitions_from(frame.state);

        let mut successors: Vec<Frame> = Vec::new();
        for transition in transitions {
            match fst.symbols().kind(transition.input) {
                SymbolKind::Epsilon => {
                    let flags = frame.flags.clone();
                    successors.extend(step_epsilon(fst, &frame, transition, flags, token));
                }
                SymbolKind::Flag(flag) => {
                    if let Some(flags) = frame.flags.apply(&flag) {
                        successors.extend(step_epsilon(fst, &frame, transition, flags, token));
                    }
                }
                SymbolKind::Regular => {
                    if token == Some(Token::Symbol(transition.input)) {
                        successors.push(step_consuming(fst, &frame, transition, tokens[frame.pos]));
                    }
                }
                // Wildcards fire after the state's ordinary transitions.
                SymbolKind::Identity | SymbolKind::Unknown => {}
            }
        }
        if let Some(unknown_token @ Token::Unknown(_)) = token {
            // Unknown transitions are tried before identity transitions.
            for wanted in [SymbolKind::Unknown, SymbolKind::Identity] {
                for transition in transitions {
                    if fst.symbols().kind(transition.input) == wanted {
                        successors.push(step_consuming(fst, &frame, transition, unknown_token));
                    }
                }
            }
        }

        // Reverse so the first successor is popped first.
        while let Some(successor) = successors.pop() {
            stack.push(successor);
        }
    }

    results.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut seen: hashbrown::HashSet<(String, u64)> = hashbrown::HashSet::new();
    results.retain(|(output, weight)| seen.insert((output.clone(), weight.to_bits())));
    Ok(results)
}

/// Successor for a transition that consumes no input, or `None` when it
/// would close an epsilon cycle.
fn step_epsilon(
    fst: &Transducer,
    frame: &Frame,
    transition: &Transition,
    flags: FlagState,
    token: Option<Token>,
) -> Option<Frame> {
    let signature = (transition.to, flags.clone());
    if frame.visited.contains(&signature) {
        return None;
    }
    Some(Frame {
        state: transition.to,
        pos: frame.pos,
        visited: frame.visited.update(signature),
        flags,
        output: extend_output(fst, &frame.output, transition, token),
        weight: frame.weight + transition.weight,
    })
}

/// Successor for a transition that consumes the current token.
fn step_consuming(
    fst: &Transducer,
    frame: &Frame,
    transition: &Transition,
    token: Token,
) -> Frame {
    let flags = frame.flags.clone();
    Frame {
        state: transition.to,
        pos: frame.pos + 1,
        visited: HashSet::unit((transition.to, flags.clone())),
        flags,
        output: extend_output(fst, &frame.output, transition, Some(token)),
        weight: frame.weight + transition.weight,
    }
}

/// Append a transition's contribution to the output tape.
fn extend_output(
    fst: &Transducer,
    output: &[OutItem],
    transition: &Transition,
    token: Option<Token>,
) -> Vec<OutItem> {
    let mut output = output.to_vec();
    match fst.symbols().kind(transition.output) {
        SymbolKind::Epsilon => {}
        // Kept on the tape so that unprocessed output can show them.
        SymbolKind::Flag(_) => output.push(OutItem::Sym(transition.output)),
        SymbolKind::Identity | SymbolKind::Unknown => match token {
            Some(Token::Unknown(ch)) => output.push(OutItem::Verbatim(ch)),
            Some(Token::Symbol(id)) => output.push(OutItem::Sym(id)),
            // Input exhausted: nothing to copy, emit the literal text.
            None => output.push(OutItem::Sym(transition.output)),
        },
        SymbolKind::Regular => output.push(OutItem::Sym(transition.output)),
    }
    output
}

fn render(fst: &Transducer, output: &[OutItem], post_process: bool) -> String {
    let mut rendered = String::new();
    for item in output {
        match *item {
            OutItem::Sym(id) => {
                if post_process && matches!(fst.symbols().kind(id), SymbolKind::Flag(_)) {
                    continue;
                }
                rendered.push_str(fst.symbols().text_of(id));
            }
            OutItem::Verbatim(ch) => rendered.push(ch),
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transducer::Transducer;

    fn fst(code: &str) -> Transducer {
        Transducer::from_tabular_str(code).unwrap()
    }

    fn outputs(fst: &Transducer, input: &str) -> Vec<(String, f64)> {
        fst.lookup(input, LookupOptions::default()).unwrap()
    }

    #[test]
    fn simple_acceptor() {
        let fst = fst("0\t1\ta\ta\n1");
        assert_eq!(outputs(&fst, "a"), vec![("a".to_string(), 0.0)]);
        assert_eq!(outputs(&fst, "b"), Vec::new());
    }

    #[test]
    fn rejects_partial_consumption() {
        let fst = fst("0\t1\ta\ta\n1");
        assert_eq!(outputs(&fst, "aa"), Vec::new());
        assert_eq!(outputs(&fst, ""), Vec::new());
    }

    #[test]
    fn empty_input_on_final_start_state() {
        let fst = fst("0\t0.5\n0\t1\ta\ta\n1");
        assert_eq!(outputs(&fst, ""), vec![("".to_string(), 0.5)]);
    }

    #[test]
    fn epsilon_transition_produces_output() {
        let fst = fst("0\t1\t@0@\th\n1\t2\ta\ti\n2");
        assert_eq!(outputs(&fst, "a"), vec![("hi".to_string(), 0.0)]);
    }

    #[test]
    fn weighted_paths_sorted_ascending() {
        let fst = fst("0\t1\ta\tx\t1\n0\t2\ta\ty\t2\n1\n2");
        assert_eq!(
            outputs(&fst, "a"),
            vec![("x".to_string(), 1.0), ("y".to_string(), 2.0)]
        );
    }

    #[test]
    fn final_weight_adds_to_path_weight() {
        let fst = fst("0\t1\ta\tb\n1\t1.0");
        assert_eq!(outputs(&fst, "a"), vec![("b".to_string(), 1.0)]);
    }

    #[test]
    fn ties_keep_first_encountered_order() {
        let fst = fst("0\t1\ta\tx\n0\t2\ta\ty\n1\n2");
        assert_eq!(
            outputs(&fst, "a"),
            vec![("x".to_string(), 0.0), ("y".to_string(), 0.0)]
        );
    }

    #[test]
    fn duplicate_analyses_collapse() {
        // Two derivations of the same output and weight.
        let fst = fst("0\t1\ta\tx\n0\t2\ta\tx\n1\n2");
        assert_eq!(outputs(&fst, "a"), vec![("x".to_string(), 0.0)]);
    }

    #[test]
    fn same_output_different_weight_is_kept() {
        let fst = fst("0\t1\ta\tx\t1\n0\t2\ta\tx\t2\n1\n2");
        assert_eq!(
            outputs(&fst, "a"),
            vec![("x".to_string(), 1.0), ("x".to_string(), 2.0)]
        );
    }

    #[test]
    fn positive_set_satisfies_require() {
        let fst = fst("0\t1\t@P.CASE.NOM@\t@P.CASE.NOM@\n1\t2\t@R.CASE.NOM@\t+N\n2");
        assert_eq!(outputs(&fst, ""), vec![("+N".to_string(), 0.0)]);
    }

    #[test]
    fn failed_require_prunes_the_path() {
        let fst = fst("0\t1\t@P.CASE.NOM@\t@P.CASE.NOM@\n1\t2\t@R.CASE.GEN@\t+N\n2");
        assert_eq!(outputs(&fst, ""), Vec::new());
    }

    #[test]
    fn flag_state_is_restored_on_backtrack() {
        // The first branch sets CASE=NOM and dead-ends; the second branch
        // must still see CASE unset.
        let code = "0\t1\t@P.CASE.NOM@\t@0@\n\
                    1\t2\t@R.CASE.GEN@\tdead\n\
                    0\t3\t@D.CASE@\tclean\n\
                    3";
        let fst = fst(code);
        assert_eq!(outputs(&fst, ""), vec![("clean".to_string(), 0.0)]);
    }

    #[test]
    fn post_processing_strips_flags_from_output() {
        let fst = fst("0\t1\t@P.CASE.NOM@\t@P.CASE.NOM@\n1\t2\ta\ta\n2");
        assert_eq!(outputs(&fst, "a"), vec![("a".to_string(), 0.0)]);
        let raw = fst
            .lookup(
                "a",
                LookupOptions {
                    post_process: false,
                    ..LookupOptions::default()
                },
            )
            .unwrap();
        assert_eq!(raw, vec![("@P.CASE.NOM@a".to_string(), 0.0)]);
    }

    #[test]
    fn pure_epsilon_cycle_terminates() {
        // 0 -> 1 -> 0 on epsilon only, with an escape to 2.
        let code = "0\t1\t@0@\tx\n1\t0\t@0@\ty\n0\t2\ta\ta\n2";
        let fst = fst(code);
        assert_eq!(outputs(&fst, "a"), vec![("a".to_string(), 0.0)]);
    }

    #[test]
    fn epsilon_self_loop_terminates() {
        let fst = fst("0\t0\t@0@\tx\n0\t1\ta\ta\n1");
        assert_eq!(outputs(&fst, "a"), vec![("a".to_string(), 0.0)]);
    }

    #[test]
    fn flag_progress_allows_revisiting_a_state() {
        // Passing through state 1 twice is fine when the flag state
        // changed in between.
        let code = "0\t1\t@0@\t@0@\n\
                    1\t2\t@P.X.A@\t@P.X.A@\n\
                    2\t1\t@P.X.B@\t@P.X.B@\n\
                    1\t3\t@R.X.B@\tok\n\
                    3";
        let fst = fst(code);
        assert_eq!(outputs(&fst, ""), vec![("ok".to_string(), 0.0)]);
    }

    #[test]
    fn unknown_input_matches_wildcards() {
        let bare = fst("0\t1\t@_UNKNOWN_SYMBOL_@\tq\n1");
        assert_eq!(outputs(&bare, "z"), vec![("q".to_string(), 0.0)]);
        // Known symbols are not accepted by wildcards.
        let mixed = fst("0\t1\t@_UNKNOWN_SYMBOL_@\tq\n0\t2\ta\ta\n1\n2");
        assert_eq!(outputs(&mixed, "a"), vec![("a".to_string(), 0.0)]);
    }

    #[test]
    fn identity_copies_the_input_character() {
        let fst = fst("0\t1\t@_IDENTITY_SYMBOL_@\t@_IDENTITY_SYMBOL_@\n1");
        assert_eq!(outputs(&fst, "\u{00e5}"), vec![("\u{00e5}".to_string(), 0.0)]);
    }

    #[test]
    fn unknown_transitions_fire_before_identity() {
        // Same weight on both paths; order pins the precedence.
        let code = "0\t1\t@_IDENTITY_SYMBOL_@\t@_IDENTITY_SYMBOL_@\n\
                    0\t2\t@_UNKNOWN_SYMBOL_@\tu\n\
                    1\n2";
        let fst = fst(code);
        assert_eq!(
            outputs(&fst, "z"),
            vec![("u".to_string(), 0.0), ("z".to_string(), 0.0)]
        );
    }

    #[test]
    fn untokenizable_input_without_wildcard() {
        let fst = fst("0\t1\ta\ta\n1");
        assert_eq!(
            fst.lookup("ax", LookupOptions::default()).unwrap_err(),
            LookupError::UntokenizableInput(1)
        );
    }

    #[test]
    fn lookup_from_a_non_default_start_state() {
        let fst = fst("0\t1\ta\ta\n1\t2\tb\tb\n2");
        let options = LookupOptions {
            start_state: 1,
            ..LookupOptions::default()
        };
        assert_eq!(
            fst.lookup("b", options).unwrap(),
            vec![("b".to_string(), 0.0)]
        );
        assert_eq!(fst.lookup("ab", options).unwrap(), Vec::new());
    }

    #[test]
    fn long_input_with_many_branch_points() {
        // Every position branches; the detour through state 1 needs a 'b'
        // that never comes, so each branch backtracks immediately. 1,000
        // input symbols, a branch point at each one.
        let code = "0\t0\ta\ta\n0\t1\ta\tA\n1\t2\tb\tb\n0\n2";
        let fst = fst(code);
        let input = "a".repeat(1_000);
        let found = fst.lookup(&input, LookupOptions::default()).unwrap();
        assert_eq!(found, vec![(input, 0.0)]);
    }
}
