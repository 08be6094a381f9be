// ranges.rs — Iteration-range propagation (pass 1)
//
// Walks the compute regions and stamps each nested computation block with its
// inherited horizontal extent and a resolved vertical interval. A bound given
// relative to the grid start keeps its raw offset; a bound given relative to
// the domain end becomes an offset against the `K` extent symbol.
//
// Preconditions: well-formed input tree (front-end contract).
// Postconditions: every block id in the tree has an entry in the table.
// Failure modes: none; this pass is purely structural.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::id::BlockId;
use crate::ir::{IntervalBound, LevelMarker, StencilIr};

// ── Vertical bounds ─────────────────────────────────────────────────────────

/// A resolved vertical bound: either an absolute level counted from the grid
/// start, or an offset against the domain-end symbol `K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerticalBound {
    Start(i64),
    End(i64),
}

impl VerticalBound {
    /// Resolve an abstract interval bound.
    pub fn resolve(bound: IntervalBound) -> Self {
        match bound.level {
            LevelMarker::Start => VerticalBound::Start(bound.offset),
            LevelMarker::End => VerticalBound::End(bound.offset),
        }
    }

    /// Shift the bound by a window offset.
    pub fn shifted(self, v: i64) -> Self {
        match self {
            VerticalBound::Start(o) => VerticalBound::Start(o + v),
            VerticalBound::End(o) => VerticalBound::End(o + v),
        }
    }
}

// Start-relative bounds sort below end-relative bounds; the domain is never
// short enough for an end-relative level to precede a start-relative one.
impl Ord for VerticalBound {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use VerticalBound::*;
        match (self, other) {
            (Start(a), Start(b)) => a.cmp(b),
            (End(a), End(b)) => a.cmp(b),
            (Start(_), End(_)) => std::cmp::Ordering::Less,
            (End(_), Start(_)) => std::cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for VerticalBound {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VerticalBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerticalBound::Start(o) => write!(f, "{}", o),
            VerticalBound::End(o) => write!(f, "K{:+}", o),
        }
    }
}

impl Serialize for VerticalBound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ── Resolved block ranges ───────────────────────────────────────────────────

/// Resolved iteration ranges of one computation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRanges {
    pub i_range: (i64, i64),
    pub j_range: (i64, i64),
    pub k_range: (VerticalBound, VerticalBound),
}

/// Side table produced by this pass, keyed by block id.
#[derive(Debug, Default)]
pub struct RangeTable {
    ranges: BTreeMap<BlockId, BlockRanges>,
}

impl RangeTable {
    pub fn get(&self, id: BlockId) -> Option<&BlockRanges> {
        self.ranges.get(&id)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Stamp every computation block with its region's horizontal extent and its
/// resolved vertical interval. Each region scope binds its own extent, so a
/// later region is unaffected by a previous sibling.
pub fn propagate_ranges(ir: &StencilIr) -> RangeTable {
    let mut table = RangeTable::default();
    for region in &ir.regions {
        for block in &region.blocks {
            table.ranges.insert(
                block.id,
                BlockRanges {
                    i_range: region.i_extent,
                    j_range: region.j_extent,
                    k_range: (
                        VerticalBound::resolve(block.interval.start),
                        VerticalBound::resolve(block.interval.end),
                    ),
                },
            );
        }
    }
    table
}

// ── Tests ───────────────────────────────────────────────────────────────────
