use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// A single modifier key that can take part in a target combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Option / Alt
    Option,
    /// Command / Super
    Command,
    /// Control
    Control,
    /// Shift
    Shift,
    /// Function (Fn / Globe)
    Function,
}

impl Modifier {
    /// All modifiers in canonical display order
    pub const ALL: [Self; 5] = [
        Self::Control,
        Self::Option,
        Self::Shift,
        Self::Command,
        Self::Function,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Option => 1,
            Self::Command => 1 << 1,
            Self::Control => 1 << 2,
            Self::Shift => 1 << 3,
            Self::Function => 1 << 4,
        }
    }

    /// Human-readable name, matching the config spelling
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Option => "Option",
            Self::Command => "Command",
            Self::Control => "Control",
            Self::Shift => "Shift",
            Self::Function => "Function",
        }
    }
}

/// Modifier name could not be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown modifier: {0}")]
pub struct ModifierParseError(pub String);

impl FromStr for Modifier {
    type Err = ModifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "option" | "alt" | "opt" => Ok(Self::Option),
            "command" | "cmd" | "super" => Ok(Self::Command),
            "control" | "ctrl" => Ok(Self::Control),
            "shift" => Ok(Self::Shift),
            "function" | "fn" => Ok(Self::Function),
            _ => Err(ModifierParseError(s.to_owned())),
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of currently active (or required) modifier keys, stored as a bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierSet(u8);

impl ModifierSet {
    /// No modifiers held
    pub const EMPTY: Self = Self(0);

    /// Builds a set from any iterator of modifiers
    #[must_use]
    pub fn from_modifiers(modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        modifiers.into_iter().fold(Self::EMPTY, Self::with)
    }

    /// Returns a copy of this set with `modifier` added
    #[must_use]
    pub const fn with(self, modifier: Modifier) -> Self {
        Self(self.0 | modifier.bit())
    }

    /// Adds a modifier in place
    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    /// Removes a modifier in place
    pub fn remove(&mut self, modifier: Modifier) {
        self.0 &= !modifier.bit();
    }

    /// Whether `modifier` is in the set
    #[must_use]
    pub const fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    /// Subset test: every modifier in `other` is also in `self`
    #[must_use]
    pub const fn is_superset_of(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no modifiers are set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates modifiers in canonical order
    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        Self::from_modifiers(iter)
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        for (i, modifier) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            f.write_str(modifier.name())?;
        }
        Ok(())
    }
}

/// The user-configured set of modifiers that must all be held to count as pressed.
///
/// Never empty: constructing one from an empty set puts [`TargetCombination::DEFAULT_KEY`]
/// back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetCombination(ModifierSet);

impl TargetCombination {
    /// Key forced back in when the configured combination is empty
    pub const DEFAULT_KEY: Modifier = Modifier::Option;

    /// Creates a target combination, correcting an empty set
    #[must_use]
    pub fn new(set: ModifierSet) -> Self {
        if set.is_empty() {
            warn!(
                fallback = %Self::DEFAULT_KEY,
                "empty target combination, forcing default key back in"
            );
            return Self(ModifierSet::EMPTY.with(Self::DEFAULT_KEY));
        }
        Self(set)
    }

    /// Parses modifier names from config
    ///
    /// # Errors
    /// Returns error on the first unrecognized modifier name
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ModifierParseError> {
        let set = names
            .iter()
            .map(|name| name.as_ref().parse::<Modifier>())
            .collect::<Result<ModifierSet, _>>()?;
        Ok(Self::new(set))
    }

    /// The combined flag set
    #[must_use]
    pub const fn modifiers(self) -> ModifierSet {
        self.0
    }

    /// Whether `snapshot` holds every key of this combination (extra keys allowed)
    #[must_use]
    pub const fn is_satisfied_by(self, snapshot: ModifierSet) -> bool {
        snapshot.is_superset_of(self.0)
    }
}

impl Default for TargetCombination {
    fn default() -> Self {
        Self(ModifierSet::EMPTY.with(Modifier::Option).with(Modifier::Command))
    }
}

impl fmt::Display for TargetCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
