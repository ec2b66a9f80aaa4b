//! The type lattice used during type resolution.
//!
//! Every node and every parameter carries a [`TypeState`]. States only ever
//! narrow: `Unknown` to `Weak(set)` to `Strong(kind)`. Transitions are pure and
//! return the new state, or a [`Conflict`] when the constraint cannot hold.

use crate::value::SupportedValueType;
use std::fmt::{self, Display, Formatter};

/// A set of concrete value types, stored as bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSet(u8);

impl TypeSet {
    /// No type
    pub const EMPTY: Self = Self(0);
    /// Numbers
    pub const NUMERIC: Self = Self(0b0001);
    /// Booleans
    pub const BOOLEAN: Self = Self(0b0010);
    /// Strings
    pub const STRING: Self = Self(0b0100);
    /// Byte arrays
    pub const BYTE_ARRAY: Self = Self(0b1000);
    /// Every concrete type
    pub const ALL: Self = Self(0b1111);

    /// The singleton set for `kind`. `Unknown` maps to the full set.
    pub fn of(kind: SupportedValueType) -> Self {
        match kind {
            SupportedValueType::Numeric => Self::NUMERIC,
            SupportedValueType::Boolean => Self::BOOLEAN,
            SupportedValueType::String => Self::STRING,
            SupportedValueType::ByteArray => Self::BYTE_ARRAY,
            SupportedValueType::Unknown => Self::ALL,
        }
    }

    /// Types in either set
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Types in both sets
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Check if `kind` belongs to the set
    pub fn contains(self, kind: SupportedValueType) -> bool {
        kind != SupportedValueType::Unknown && self.intersection(Self::of(kind)) == Self::of(kind)
    }

    /// Check if no type is left
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The only member of the set, if it has exactly one
    pub fn single(self) -> Option<SupportedValueType> {
        match self {
            Self::NUMERIC => Some(SupportedValueType::Numeric),
            Self::BOOLEAN => Some(SupportedValueType::Boolean),
            Self::STRING => Some(SupportedValueType::String),
            Self::BYTE_ARRAY => Some(SupportedValueType::ByteArray),
            _ => None,
        }
    }

    /// The members of the set
    pub fn kinds(self) -> impl Iterator<Item = SupportedValueType> {
        [
            SupportedValueType::Numeric,
            SupportedValueType::Boolean,
            SupportedValueType::String,
            SupportedValueType::ByteArray,
        ]
        .into_iter()
        .filter(move |kind| self.contains(*kind))
    }
}

impl Display for TypeSet {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let names: Vec<String> = self.kinds().map(|kind| kind.to_string()).collect();
        write!(fmt, "{{{}}}", names.join(", "))
    }
}

/// Raised when a constraint cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// The state before the constraint
    pub current: TypeState,
    /// The types the constraint allowed
    pub requested: TypeSet,
}

impl Display for Conflict {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "{} cannot be narrowed to {}", self.current, self.requested)
    }
}

/// Progress of the type determination of one node or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState {
    /// Nothing is known yet
    Unknown,
    /// One of several types
    Weak(TypeSet),
    /// Exactly one type
    Strong(SupportedValueType),
}

impl Default for TypeState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl TypeState {
    /// The set of types still possible in this state
    pub fn possible(self) -> TypeSet {
        match self {
            Self::Unknown => TypeSet::ALL,
            Self::Weak(set) => set,
            Self::Strong(kind) => TypeSet::of(kind),
        }
    }

    /// The determined type, or `Unknown`
    pub fn value_type(self) -> SupportedValueType {
        match self {
            Self::Strong(kind) => kind,
            Self::Unknown | Self::Weak(_) => SupportedValueType::Unknown,
        }
    }

    /// Check if the type is determined
    pub fn is_strong(self) -> bool {
        matches!(self, Self::Strong(_))
    }

    /// Narrow to the types of `set`. A single remaining type becomes strong.
    pub fn determine_weakly(self, set: TypeSet) -> Result<Self, Conflict> {
        let narrowed = self.possible().intersection(set);
        if narrowed.is_empty() {
            return Err(Conflict {
                current: self,
                requested: set,
            });
        }
        Ok(match narrowed.single() {
            Some(kind) => Self::Strong(kind),
            None if narrowed == TypeSet::ALL => Self::Unknown,
            None => Self::Weak(narrowed),
        })
    }

    /// Require exactly `kind`.
    pub fn determine_strongly(self, kind: SupportedValueType) -> Result<Self, Conflict> {
        let requested = TypeSet::of(kind);
        if kind == SupportedValueType::Unknown || !self.possible().contains(kind) {
            return Err(Conflict {
                current: self,
                requested,
            });
        }
        Ok(Self::Strong(kind))
    }
}

impl Display for TypeState {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Unknown => fmt.write_str("unknown"),
            Self::Weak(set) => write!(fmt, "one of {}", set),
            Self::Strong(kind) => write!(fmt, "{}", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TypeSet, TypeState};
    use crate::value::SupportedValueType;

    #[test]
    fn weak_collapses_to_strong() {
        let state = TypeState::Unknown
            .determine_weakly(TypeSet::NUMERIC.union(TypeSet::STRING))
            .unwrap();
        assert_eq!(state, TypeState::Weak(TypeSet::NUMERIC.union(TypeSet::STRING)));

        let state = state
            .determine_weakly(TypeSet::STRING.union(TypeSet::BOOLEAN))
            .unwrap();
        assert_eq!(state, TypeState::Strong(SupportedValueType::String));
    }

    #[test]
    fn conflicts() {
        let numeric = TypeState::Strong(SupportedValueType::Numeric);
        assert!(numeric.determine_strongly(SupportedValueType::String).is_err());
        assert!(numeric.determine_weakly(TypeSet::BOOLEAN).is_err());
        assert!(numeric.determine_strongly(SupportedValueType::Numeric).is_ok());

        let weak = TypeState::Weak(TypeSet::NUMERIC.union(TypeSet::BYTE_ARRAY));
        assert!(weak.determine_strongly(SupportedValueType::Boolean).is_err());
    }

    #[test]
    fn sets() {
        let set = TypeSet::NUMERIC.union(TypeSet::BOOLEAN);
        assert!(set.contains(SupportedValueType::Boolean));
        assert!(!set.contains(SupportedValueType::String));
        assert_eq!(set.single(), None);
        assert_eq!(TypeSet::STRING.single(), Some(SupportedValueType::String));
        assert_eq!(set.to_string(), "{numeric, boolean}");
    }
}
