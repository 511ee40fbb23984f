// Flag diacritics: parsing, per-table feature/value interning, and the
// runtime flag state threaded through a lookup path.

use hashbrown::HashMap;

use crate::ParseError;

/// The six flag diacritic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagOp {
    /// Positive set: `@P.F.V@` unconditionally sets `F` to `V`.
    P,
    /// Negative set: `@N.F.V@` sets `F` to "anything but `V`".
    N,
    /// Require: `@R.F@` fires only if `F` is set; `@R.F.V@` only if the
    /// stored value unifies with `V`.
    R,
    /// Disallow: `@D.F@` fires only if `F` is unset; `@D.F.V@` also fires
    /// when the stored value does not unify with `V`.
    D,
    /// Clear: removes `F` from the flag state.
    C,
    /// Unify: sets `F` to `V` unless the stored value contradicts it.
    U,
}

/// A parsed flag diacritic. Feature and value names are interned per
/// symbol table; `value` is `None` for the one-argument `R`/`D`/`C` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagDiacritic {
    pub op: FlagOp,
    pub feature: u16,
    pub value: Option<u16>,
}

/// Interns flag feature and value names across all symbols of one table.
///
/// Features and values are assigned sequential indices as they are first
/// encountered, so the same name always maps to the same index within a
/// transducer.
#[derive(Debug, Default)]
pub struct FlagRegistry {
    features: HashMap<String, u16>,
    values: HashMap<String, u16>,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct features seen so far.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Try to parse `text` as a flag diacritic of the form `@OP.F@` or
    /// `@OP.F.V@`.
    ///
    /// Returns `Ok(None)` for text that does not carry the flag envelope
    /// at all (no `@...@` wrapper, or an unknown operation letter); such
    /// text is an ordinary symbol. Text that does carry the envelope but
    /// violates the flag grammar is a load-time error.
    pub fn parse(&mut self, text: &str) -> Result<Option<FlagDiacritic>, ParseError> {
        let Some(inner) = text
            .strip_prefix('@')
            .and_then(|rest| rest.strip_suffix('@'))
        else {
            return Ok(None);
        };
        // Values may contain dots, so split off at most the op and feature.
        let mut parts = inner.splitn(3, '.');
        let op = match parts.next() {
            Some("P") => FlagOp::P,
            Some("N") => FlagOp::N,
            Some("R") => FlagOp::R,
            Some("D") => FlagOp::D,
            Some("C") => FlagOp::C,
            Some("U") => FlagOp::U,
            _ => return Ok(None),
        };
        let malformed = || ParseError::MalformedFlagDiacritic(text.to_string());
        let feature = match parts.next() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(malformed()),
        };
        let value = match parts.next() {
            Some(name) if !name.is_empty() => Some(name),
            Some(_) => return Err(malformed()),
            None => None,
        };
        if value.is_none() && matches!(op, FlagOp::P | FlagOp::N | FlagOp::U) {
            return Err(malformed());
        }
        let feature = Self::intern(&mut self.features, feature);
        let value = value.map(|name| Self::intern(&mut self.values, name));
        Ok(Some(FlagDiacritic { op, feature, value }))
    }

    fn intern(pool: &mut HashMap<String, u16>, name: &str) -> u16 {
        if let Some(&id) = pool.get(name) {
            return id;
        }
        let id = pool.len() as u16;
        pool.insert(name.to_string(), id);
        id
    }
}

/// What a feature is set to: positively to a value, or negatively
/// ("anything but" the value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagValue {
    Positive(u16),
    Negative(u16),
}

impl FlagValue {
    /// Whether the stored value unifies with a queried value id.
    fn unifies_with(self, queried: u16) -> bool {
        match self {
            FlagValue::Positive(stored) => stored == queried,
            FlagValue::Negative(stored) => stored != queried,
        }
    }
}

/// The per-path flag dictionary.
///
/// Persistent: the map shares structure with the state it was branched
/// from, so taking a snapshot at a branch point is O(1) and backtracking
/// simply drops the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlagState(im::HashMap<u16, FlagValue>);

impl FlagState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply a flag diacritic to this state.
    ///
    /// Returns the successor state if the operation's precondition holds,
    /// `None` if the transition must not fire. The receiver is never
    /// modified.
    pub fn apply(&self, flag: &FlagDiacritic) -> Option<FlagState> {
        match (flag.op, flag.value) {
            (FlagOp::P, Some(value)) => Some(FlagState(
                self.0.update(flag.feature, FlagValue::Positive(value)),
            )),
            (FlagOp::N, Some(value)) => Some(FlagState(
                self.0.update(flag.feature, FlagValue::Negative(value)),
            )),
            (FlagOp::C, _) => Some(FlagState(self.0.without(&flag.feature))),
            (FlagOp::R, None) => self
                .0
                .contains_key(&flag.feature)
                .then(|| self.clone()),
            (FlagOp::R, Some(value)) => match self.0.get(&flag.feature) {
                Some(stored) if stored.unifies_with(value) => Some(self.clone()),
                _ => None,
            },
            (FlagOp::D, None) => (!self.0.contains_key(&flag.feature)).then(|| self.clone()),
            (FlagOp::D, Some(value)) => match self.0.get(&flag.feature) {
                Some(stored) if stored.unifies_with(value) => None,
                _ => Some(self.clone()),
            },
            (FlagOp::U, Some(value)) => match self.0.get(&flag.feature) {
                Some(FlagValue::Positive(stored)) if *stored != value => None,
                Some(FlagValue::Negative(stored)) if *stored == value => None,
                _ => Some(FlagState(
                    self.0.update(flag.feature, FlagValue::Positive(value)),
                )),
            },
            // Value-less P/N/U never get past the parser.
            (FlagOp::P | FlagOp::N | FlagOp::U, None) => None,
        }
    }
}
