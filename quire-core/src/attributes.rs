//! Closed formatting-attribute schema with last-writer-wins registers.
//!
//! Attribute names are an explicit enum, parsed and validated at the
//! boundary. Each character keeps one register per name; concurrent writes
//! are resolved by the writer's [`CharId`] (Lamport order), never by wall
//! clock, so every replica picks the same winner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ReplicaError;
use crate::id::CharId;

/// Formatting attribute names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeName {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
}

impl AttributeName {
    pub const ALL: [AttributeName; 6] = [
        AttributeName::Bold,
        AttributeName::Italic,
        AttributeName::Underline,
        AttributeName::Strikethrough,
        AttributeName::Superscript,
        AttributeName::Subscript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::Strikethrough => "strikethrough",
            Self::Superscript => "superscript",
            Self::Subscript => "subscript",
        }
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeName {
    type Err = ReplicaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == lower)
            .ok_or_else(|| ReplicaError::UnknownAttribute(s.to_string()))
    }
}

/// One last-writer-wins register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwAttribute {
    pub value: bool,
    /// Identifier of the write that produced `value`.
    pub id: CharId,
}

/// Face a character is measured and drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => Self::Regular,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (true, true) => Self::BoldItalic,
        }
    }
}

/// Attribute bag of a single character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    registers: BTreeMap<AttributeName, LwwAttribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a write. Returns `true` if it became the visible value.
    pub fn apply(&mut self, name: AttributeName, value: bool, id: CharId) -> bool {
        match self.registers.get(&name) {
            Some(current) if current.id >= id => false,
            _ => {
                self.registers.insert(name, LwwAttribute { value, id });
                true
            }
        }
    }

    /// Current value; unset attributes read as `false`.
    pub fn get(&self, name: AttributeName) -> bool {
        self.registers.get(&name).map(|r| r.value).unwrap_or(false)
    }

    pub fn register(&self, name: AttributeName) -> Option<&LwwAttribute> {
        self.registers.get(&name)
    }

    /// Names currently set to `true`.
    pub fn active(&self) -> impl Iterator<Item = AttributeName> + '_ {
        self.registers
            .iter()
            .filter(|(_, r)| r.value)
            .map(|(name, _)| *name)
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn font_style(&self) -> FontStyle {
        FontStyle::from_flags(
            self.get(AttributeName::Bold),
            self.get(AttributeName::Italic),
        )
    }
}
