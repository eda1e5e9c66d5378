//! Identifier Scheme
//!
//! Canonical ids are a one-letter kind prefix followed by exactly five decimal
//! digits:
//!
//! ```text
//!   a00001   action
//!   o00001   object
//!   s00001   state (only unique inside its object)
//!   o00001s00001   composite state id, the only external form of a state
//! ```
//!
//! Everything here is side-effect free. Id *allocation* is done through an
//! explicit [`IdAllocator`] value that the normalizer threads through a pass,
//! so numbering never depends on state left over from an earlier invocation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Number of digits after the kind prefix.
pub const ID_DIGITS: usize = 5;

/// Largest counter representable in [`ID_DIGITS`] digits.
pub const MAX_ID_NUMBER: u32 = 99_999;

/// State id of the synthetic state given to objects without discovered states.
pub const NULL_STATE_ID: &str = "s00000";

/// State name of the synthetic null state.
pub const NULL_STATE_NAME: &str = "null";

// ============================================================================
// Kinds & errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Action,
    Object,
    State,
}

impl IdKind {
    pub fn prefix(self) -> char {
        match self {
            IdKind::Action => 'a',
            IdKind::Object => 'o',
            IdKind::State => 's',
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'a' => Some(IdKind::Action),
            'o' => Some(IdKind::Object),
            's' => Some(IdKind::State),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IdKind::Action => "action",
            IdKind::Object => "object",
            IdKind::State => "state",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid {kind} id: {value:?}")]
    Invalid { kind: IdKind, value: String },
    #[error("invalid node reference: {0:?}")]
    InvalidNodeRef(String),
    #[error("{0} id space exhausted (max {MAX_ID_NUMBER})")]
    Exhausted(IdKind),
}

/// A successfully parsed canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId {
    pub kind: IdKind,
    pub number: u32,
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([aos])(\d{5})$").expect("static id pattern"))
}

fn digit_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("static digit pattern"))
}

// ============================================================================
// Formatting & parsing
// ============================================================================

/// Zero-pad `counter` to five digits behind the kind prefix.
pub fn format_id(kind: IdKind, counter: u32) -> Result<String, IdError> {
    if counter > MAX_ID_NUMBER {
        return Err(IdError::Exhausted(kind));
    }
    Ok(format!("{}{:0width$}", kind.prefix(), counter, width = ID_DIGITS))
}

/// Parse a canonical id of any kind.
pub fn parse_id(value: &str) -> Option<ParsedId> {
    let caps = id_pattern().captures(value)?;
    let kind = caps[1].chars().next().and_then(IdKind::from_prefix)?;
    let number = caps[2].parse().ok()?;
    Some(ParsedId { kind, number })
}

/// True when `value` is a canonical id of exactly `kind`.
pub fn is_valid(kind: IdKind, value: &str) -> bool {
    matches!(parse_id(value), Some(parsed) if parsed.kind == kind)
}

/// Recover a malformed id from its first run of digits (`a7` → `a00007`,
/// `Action_12` → `a00012`).
///
/// Returns `None` when there are no digits, when the number does not fit
/// five digits, or when it is zero for anything other than a state
/// (`s00000` is the null state; `a00000`/`o00000` are never produced).
pub fn recover_id(kind: IdKind, raw: &str) -> Option<String> {
    let digits = digit_run_pattern().find(raw)?.as_str();
    let number: u32 = digits.parse().ok()?;
    if number == 0 && kind != IdKind::State {
        return None;
    }
    format_id(kind, number).ok()
}

/// Composite state id: plain concatenation.
pub fn composite(object_id: &str, state_id: &str) -> String {
    let mut out = String::with_capacity(object_id.len() + state_id.len());
    out.push_str(object_id);
    out.push_str(state_id);
    out
}

/// The two halves of a composite state reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeParts {
    pub object_id: String,
    pub state_id: String,
    /// True when the object half matched one of the known object ids.
    pub known_object: bool,
}

/// Split a composite state id back into object and state parts.
///
/// Every known object id that prefixes `value` (with a remainder starting
/// with `s`) is tried first; a remainder that is itself a valid state id
/// wins, then the longest prefix. Only when no known id matches does the
/// syntactic split at the first `s` after index 0 apply, which is ambiguous
/// for ids that are not exactly five digits.
pub fn decompose_composite<'a, I>(value: &str, known_objects: I) -> Option<CompositeParts>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(bool, usize, &str)> = None;
    for object_id in known_objects {
        if object_id.is_empty() || object_id.len() >= value.len() {
            continue;
        }
        let Some(rest) = value.strip_prefix(object_id) else {
            continue;
        };
        if !rest.starts_with('s') {
            continue;
        }
        let candidate = (is_valid(IdKind::State, rest), object_id.len(), object_id);
        let better = match best {
            None => true,
            Some((valid, len, _)) => (candidate.0, candidate.1) > (valid, len),
        };
        if better {
            best = Some(candidate);
        }
    }

    if let Some((_, len, object_id)) = best {
        return Some(CompositeParts {
            object_id: object_id.to_string(),
            state_id: value[len..].to_string(),
            known_object: true,
        });
    }

    let split = value.get(1..)?.find('s')? + 1;
    Some(CompositeParts {
        object_id: value[..split].to_string(),
        state_id: value[split..].to_string(),
        known_object: false,
    })
}

// ============================================================================
// Allocation
// ============================================================================

/// Hands out fresh ids of one kind.
///
/// Seeded from the ids already present so that generated ids continue
/// after the highest existing numeric suffix instead of colliding with it.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    kind: IdKind,
    taken: BTreeSet<u32>,
    next: u32,
}

impl IdAllocator {
    pub fn new(kind: IdKind) -> Self {
        Self {
            kind,
            taken: BTreeSet::new(),
            next: 1,
        }
    }

    /// Seed from existing ids; ids of other kinds or invalid ids are ignored.
    pub fn seeded<'a, I>(kind: IdKind, existing: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut allocator = Self::new(kind);
        for id in existing {
            if let Some(parsed) = parse_id(id) {
                if parsed.kind == kind {
                    allocator.reserve_number(parsed.number);
                }
            }
        }
        allocator
    }

    /// Mark `number` as used. Returns false if it was already taken.
    pub fn reserve_number(&mut self, number: u32) -> bool {
        self.next = self.next.max(number.saturating_add(1));
        self.taken.insert(number)
    }

    /// Mark a canonical id as used. Returns false if taken or not of this kind.
    pub fn reserve(&mut self, id: &str) -> bool {
        match parse_id(id) {
            Some(parsed) if parsed.kind == self.kind => self.reserve_number(parsed.number),
            _ => false,
        }
    }

    pub fn is_taken(&self, id: &str) -> bool {
        match parse_id(id) {
            Some(parsed) if parsed.kind == self.kind => self.taken.contains(&parsed.number),
            _ => false,
        }
    }

    /// Highest reserved number (0 when nothing is reserved).
    pub fn highest(&self) -> u32 {
        self.taken.iter().next_back().copied().unwrap_or(0)
    }

    /// Use `seed` if it is free, otherwise continue after the highest id.
    pub fn claim(&mut self, seed: u32) -> Result<String, IdError> {
        if seed > 0 && seed <= MAX_ID_NUMBER && !self.taken.contains(&seed) {
            self.reserve_number(seed);
            return format_id(self.kind, seed);
        }
        self.next_id()
    }

    /// Next id after the highest one handed out or reserved so far.
    ///
    /// Once the top of the range is reached, the lowest free number is used
    /// instead. Fails only when every number is taken.
    pub fn next_id(&mut self) -> Result<String, IdError> {
        let mut candidate = self.next.max(1);
        while candidate <= MAX_ID_NUMBER && self.taken.contains(&candidate) {
            candidate += 1;
        }
        if candidate > MAX_ID_NUMBER {
            candidate = (1..=MAX_ID_NUMBER)
                .find(|n| !self.taken.contains(n))
                .ok_or(IdError::Exhausted(self.kind))?;
        }
        self.reserve_number(candidate);
        format_id(self.kind, candidate)
    }
}

// ============================================================================
// Typed canonical ids
// ============================================================================

macro_rules! canonical_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub const KIND: IdKind = $kind;

            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if is_valid(Self::KIND, &value) {
                    Ok(Self(value))
                } else {
                    Err(IdError::Invalid {
                        kind: Self::KIND,
                        value,
                    })
                }
            }

            pub fn from_number(number: u32) -> Result<Self, IdError> {
                format_id(Self::KIND, number).map(Self)
            }

            pub fn number(&self) -> u32 {
                self.0[1..].parse().unwrap_or_default()
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

canonical_id!(
    /// `a\d{5}`
    ActionId,
    IdKind::Action
);
canonical_id!(
    /// `o\d{5}`
    ObjectId,
    IdKind::Object
);
canonical_id!(
    /// `s\d{5}`, unique within its owning object only.
    StateId,
    IdKind::State
);

impl StateId {
    pub fn null() -> Self {
        Self(NULL_STATE_ID.to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_STATE_ID
    }
}

/// Endpoint of a connection: an action or a composite state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeRef {
    Action(ActionId),
    State(ObjectId, StateId),
}

impl NodeRef {
    /// Strict parse: `a\d{5}` or `o\d{5}s\d{5}`.
    pub fn parse(value: &str) -> Result<Self, IdError> {
        if let Ok(action) = ActionId::new(value) {
            return Ok(NodeRef::Action(action));
        }
        let width = ID_DIGITS + 1;
        if value.len() == 2 * width && value.is_char_boundary(width) {
            let (object, state) = value.split_at(width);
            if let (Ok(object), Ok(state)) = (ObjectId::new(object), StateId::new(state)) {
                return Ok(NodeRef::State(object, state));
            }
        }
        Err(IdError::InvalidNodeRef(value.to_string()))
    }

    pub fn is_action(&self) -> bool {
        matches!(self, NodeRef::Action(_))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Action(id) => f.write_str(id.as_str()),
            NodeRef::State(object, state) => write!(f, "{}{}", object, state),
        }
    }
}

impl FromStr for NodeRef {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeRef {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeRef> for String {
    fn from(node: NodeRef) -> String {
        node.to_string()
    }
}
