//! Permission bit table and tri-state permission edits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::DescriptorError;

/// One of the twelve permission bits a chmod job can edit.
///
/// Iteration order is the conventional `ls -l` order followed by the
/// special bits.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionBit {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OtherRead,
    OtherWrite,
    OtherExecute,
    Setuid,
    Setgid,
    Sticky,
}

impl PermissionBit {
    /// The mode flag this bit maps to.
    pub const fn mode_flag(self) -> u32 {
        match self {
            Self::OwnerRead => 0o400,
            Self::OwnerWrite => 0o200,
            Self::OwnerExecute => 0o100,
            Self::GroupRead => 0o040,
            Self::GroupWrite => 0o020,
            Self::GroupExecute => 0o010,
            Self::OtherRead => 0o004,
            Self::OtherWrite => 0o002,
            Self::OtherExecute => 0o001,
            Self::Setuid => 0o4000,
            Self::Setgid => 0o2000,
            Self::Sticky => 0o1000,
        }
    }

    /// All mode bits covered by the table.
    pub fn all_flags() -> u32 {
        Self::iter().fold(0, |acc, bit| acc | bit.mode_flag())
    }
}

/// What to do with a single permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Clear,
    Set,
    #[default]
    Unchanged,
}

/// A set of tri-state edits keyed by permission bit.
///
/// Bits that are absent are [`TriState::Unchanged`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionEdits(BTreeMap<PermissionBit, TriState>);

impl PermissionEdits {
    /// Create an empty edit set (everything unchanged).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit for a bit, returning self for chaining.
    pub fn with(mut self, bit: PermissionBit, state: TriState) -> Self {
        self.set(bit, state);
        self
    }

    /// Record an edit for a bit.
    pub fn set(&mut self, bit: PermissionBit, state: TriState) {
        if state == TriState::Unchanged {
            self.0.remove(&bit);
        } else {
            self.0.insert(bit, state);
        }
    }

    /// Get the edit for a bit.
    pub fn get(&self, bit: PermissionBit) -> TriState {
        self.0.get(&bit).copied().unwrap_or_default()
    }

    /// Check if no bit would change.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mode flags to clear and to set, computed in one pass over the table.
    pub fn masks(&self) -> (u32, u32) {
        PermissionBit::iter().fold((0, 0), |(clear, set), bit| match self.get(bit) {
            TriState::Clear => (clear | bit.mode_flag(), set),
            TriState::Set => (clear, set | bit.mode_flag()),
            TriState::Unchanged => (clear, set),
        })
    }

    /// Apply the edits to a mode: requested bits are cleared, then set.
    ///
    /// Bits outside the permission table (file type bits) are preserved.
    pub fn apply(&self, mode: u32) -> u32 {
        let (clear, set) = self.masks();
        (mode & !clear) | set
    }

    /// Build edits that assign an absolute octal mode: every bit is either
    /// set or cleared.
    pub fn from_mode(mode: u32) -> Self {
        let map = PermissionBit::iter()
            .map(|bit| {
                let state = if mode & bit.mode_flag() != 0 {
                    TriState::Set
                } else {
                    TriState::Clear
                };
                (bit, state)
            })
            .collect();
        Self(map)
    }

    /// Parse a chmod-style specification.
    ///
    /// Accepts either an octal mode (`755`, `0644`, `4755`) or comma
    /// separated symbolic clauses such as `u+rw,g-w,o=r,a+X`. Only the
    /// twelve table bits are supported; `X` is treated as `x`.
    pub fn parse(spec: &str) -> Result<Self, DescriptorError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(DescriptorError::InvalidPermissions {
                spec: spec.to_string(),
                message: "empty permission specification".into(),
            });
        }

        if spec.chars().all(|c| c.is_digit(8)) {
            let mode = u32::from_str_radix(spec, 8).map_err(|e| {
                DescriptorError::InvalidPermissions {
                    spec: spec.to_string(),
                    message: e.to_string(),
                }
            })?;
            if mode & !PermissionBit::all_flags() != 0 {
                return Err(DescriptorError::InvalidPermissions {
                    spec: spec.to_string(),
                    message: "mode out of range".into(),
                });
            }
            return Ok(Self::from_mode(mode));
        }

        let mut edits = Self::new();
        for clause in spec.split(',') {
            edits.apply_clause(spec, clause)?;
        }
        Ok(edits)
    }

    fn apply_clause(&mut self, spec: &str, clause: &str) -> Result<(), DescriptorError> {
        let invalid = |message: String| DescriptorError::InvalidPermissions {
            spec: spec.to_string(),
            message,
        };

        let op_index = clause
            .find(['+', '-', '='])
            .ok_or_else(|| invalid(format!("missing operator in '{clause}'")))?;
        let (who, rest) = clause.split_at(op_index);
        let mut rest = rest.chars();
        let op = rest.next().unwrap_or('+');
        let perms: String = rest.collect();

        let mut classes = Vec::new();
        for c in who.chars() {
            match c {
                'u' | 'g' | 'o' => classes.push(c),
                'a' => classes.extend(['u', 'g', 'o']),
                other => return Err(invalid(format!("unknown class '{other}'"))),
            }
        }
        if classes.is_empty() {
            classes.extend(['u', 'g', 'o']);
        }

        let mut requested = Vec::new();
        for c in perms.chars() {
            for &class in &classes {
                if let Some(bit) = bit_for(class, c).map_err(&invalid)? {
                    requested.push(bit);
                }
            }
        }

        if op == '=' {
            for &class in &classes {
                for c in ['r', 'w', 'x', 's'] {
                    if let Ok(Some(bit)) = bit_for(class, c) {
                        self.set(bit, TriState::Clear);
                    }
                }
                if class == 'o' {
                    self.set(PermissionBit::Sticky, TriState::Clear);
                }
            }
        }

        let state = if op == '-' {
            TriState::Clear
        } else {
            TriState::Set
        };
        for bit in requested {
            self.set(bit, state);
        }
        Ok(())
    }
}

/// Map a class letter and a permission letter to a table bit.
///
/// Returns `Ok(None)` for combinations that name no bit (such as `o+s`).
fn bit_for(class: char, perm: char) -> Result<Option<PermissionBit>, String> {
    use PermissionBit::*;

    let bit = match (class, perm) {
        ('u', 'r') => OwnerRead,
        ('u', 'w') => OwnerWrite,
        ('u', 'x' | 'X') => OwnerExecute,
        ('g', 'r') => GroupRead,
        ('g', 'w') => GroupWrite,
        ('g', 'x' | 'X') => GroupExecute,
        ('o', 'r') => OtherRead,
        ('o', 'w') => OtherWrite,
        ('o', 'x' | 'X') => OtherExecute,
        ('u', 's') => Setuid,
        ('g', 's') => Setgid,
        ('o', 't') => Sticky,
        ('o', 's') | ('u' | 'g', 't') => return Ok(None),
        (_, other) => return Err(format!("unknown permission '{other}'")),
    };
    Ok(Some(bit))
}
