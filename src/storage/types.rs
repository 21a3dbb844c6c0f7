//! core type-safe identifiers, names and change records for the store.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Content held by a slot.
///
/// Prompt text is a plain JSON string, structured metadata is usually an object.
pub type Content = Value;

/// A fully materialized `slot -> content` map.
pub type Snapshot = BTreeMap<SlotName, Content>;

/// Opaque, unique commit identifier.
///
/// Backed by a ULID, rendered in lowercase like the rest of our generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(Ulid);

impl CommitId {
    /// generate a fresh commit id
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// parse a CommitId from its string form (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        Ulid::from_string(&s.to_ascii_uppercase()).ok().map(Self)
    }

    /// short form of the commit id (the random tail, which differs between
    /// commits created within the same millisecond)
    pub fn short(&self) -> String {
        let full = self.to_string();
        full[full.len() - 8..].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

/// Identifier of a repository value's lineage.
///
/// Assigned once by `init` and carried unchanged by every derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(Ulid);

impl RepositoryId {
    pub(crate) fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

/// A validated slot name.
///
/// Slots are the atomic unit of diffing and conflict detection, e.g.
/// `prompt` or `metadata`. Names must be non-blank and free of control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotName(String);

impl SlotName {
    /// create a new SlotName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.trim().is_empty() {
            return Err(InvalidNameError::Empty);
        }

        for (i, c) in name.chars().enumerate() {
            if c.is_control() {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SlotName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SlotName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SlotName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlotName> for String {
    fn from(name: SlotName) -> Self {
        name.0
    }
}

/// a validated branch name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// the default branch name
    pub const MAIN: &'static str = "main";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_ref_name(&name)?;
        Ok(Self(name))
    }

    /// create the main branch name
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for BranchName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

/// a validated tag name
///
/// Tags double as diff refs, so the `HEAD` and `WORKING` sentinels are reserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// names that can't be used for tags
    const RESERVED: &'static [&'static str] = &["HEAD", "WORKING"];

    /// create a new TagName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_ref_name(&name)?;
        if Self::RESERVED.contains(&name.as_str()) {
            return Err(InvalidNameError::Reserved(name));
        }
        Ok(Self(name))
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TagName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagName> for String {
    fn from(name: TagName) -> Self {
        name.0
    }
}

/// shared rules for branch and tag names
fn validate_ref_name(name: &str) -> Result<(), InvalidNameError> {
    if name.trim().is_empty() {
        return Err(InvalidNameError::Empty);
    }
    if name.contains("..") || name.ends_with('/') || name.starts_with('/') {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }
    for (i, c) in name.chars().enumerate() {
        if c.is_whitespace() || c.is_control() {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// error type for invalid names (slots, branches, tags)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// the kind of change a slot went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Addition,
    Modification,
    Deletion,
}

impl ChangeType {
    /// classify the transition between two optional slot values
    ///
    /// returns None when nothing changed
    pub fn between(old: Option<&Content>, new: Option<&Content>) -> Option<Self> {
        match (old, new) {
            (None, Some(_)) => Some(ChangeType::Addition),
            (Some(_), None) => Some(ChangeType::Deletion),
            (Some(a), Some(b)) if a != b => Some(ChangeType::Modification),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeType::Addition => "added",
            ChangeType::Modification => "modified",
            ChangeType::Deletion => "deleted",
        };
        f.write_str(label)
    }
}

/// A pending change in the staging area.
///
/// `content` is the new slot value, and is `None` for deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedChange {
    pub slot_name: SlotName,
    pub change_type: ChangeType,
    pub content: Option<Content>,
}

/// A per-slot change record between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotChange {
    pub slot_name: SlotName,
    pub change_type: ChangeType,
    pub old_content: Option<Content>,
    pub new_content: Option<Content>,
}

impl SlotChange {
    /// build the change record for one slot, or None if the values are equal
    pub fn between(slot_name: &SlotName, old: Option<&Content>, new: Option<&Content>) -> Option<Self> {
        ChangeType::between(old, new).map(|change_type| Self {
            slot_name: slot_name.clone(),
            change_type,
            old_content: old.cloned(),
            new_content: new.cloned(),
        })
    }
}

/// A slot that both sides of a merge define differently.
///
/// Either side is `None` only for modify/delete conflicts found by the
/// merge-base strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub slot_name: SlotName,
    pub current_content: Option<Content>,
    pub incoming_content: Option<Content>,
}

impl FromStr for SlotName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
