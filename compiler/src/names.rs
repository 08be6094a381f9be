// names.rs — Canonical local names for windowed references
//
// A local name binds one `(outer name, offset, read/write role)` triple to a
// single kernel-local variable. Two accesses with the same outer name, offset,
// and role collapse to the same local name. The key is structured; text is
// produced only at kernel-emission and graph-wiring time, so ad hoc string
// formatting can never introduce collisions.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::ir::Offset;

/// Prefix for input-role local names.
pub const LOCAL_PREFIX: &str = "_loc__";
/// Prefix for output-role local names.
pub const LOCAL_OUT_PREFIX: &str = "_loc_out__";

/// Canonical identifier binding a windowed field/scalar reference to a
/// kernel-local variable. Scalars carry no offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalName {
    pub name: String,
    pub offset: Option<Offset>,
    pub is_output: bool,
}

impl LocalName {
    pub fn field(name: &str, offset: &Offset, is_output: bool) -> Self {
        Self {
            name: name.to_string(),
            offset: Some(offset.clone()),
            is_output,
        }
    }

    pub fn scalar(name: &str, is_output: bool) -> Self {
        Self {
            name: name.to_string(),
            offset: None,
            is_output,
        }
    }

    /// The opposite-role variant of this name.
    pub fn as_output(&self) -> Self {
        Self {
            name: self.name.clone(),
            offset: self.offset.clone(),
            is_output: true,
        }
    }
}

impl fmt::Display for LocalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_output {
            LOCAL_OUT_PREFIX
        } else {
            LOCAL_PREFIX
        };
        write!(f, "{}{}", prefix, self.name)?;
        if let Some(offset) = &self.offset {
            if !offset.is_zero() {
                write!(f, "_{}", offset.suffix())?;
            }
        }
        Ok(())
    }
}

impl Serialize for LocalName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
