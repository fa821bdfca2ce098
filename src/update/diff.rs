//! Diffs between zone versions.
//!
//! A [`Diff`] is the ordered list of changes one update transaction made to
//! a zone. It is built tuple by tuple while the update is processed, each
//! tuple being applied to the open zone version at the same time, and is
//! what finally ends up in the journal.

use core::cmp::Ordering;
use core::fmt;

use tracing::trace;

use crate::base::iana::Rtype;
use crate::base::name::Name;
use crate::base::rdata;
use crate::base::record::Record;
use crate::zonetree::{DbError, Version, ZoneDatabase};

//------------ DiffOp --------------------------------------------------------

/// The kind of change a tuple describes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DiffOp {
    /// The record is added.
    Add,

    /// The record is deleted.
    Delete,

    /// The record is asserted to exist.
    ///
    /// These tuples only ever appear in the list of value-dependent
    /// prerequisites and are never applied to a zone.
    Exists,
}

impl DiffOp {
    /// Returns the operation undoing this one.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            DiffOp::Add => DiffOp::Delete,
            DiffOp::Delete => DiffOp::Add,
            DiffOp::Exists => DiffOp::Exists,
        }
    }
}

impl fmt::Display for DiffOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            DiffOp::Add => "add",
            DiffOp::Delete => "del",
            DiffOp::Exists => "exists",
        })
    }
}

//------------ DiffTuple -----------------------------------------------------

/// A single change to a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffTuple {
    op: DiffOp,
    record: Record,
}

impl DiffTuple {
    pub fn new(op: DiffOp, record: Record) -> Self {
        DiffTuple { op, record }
    }

    pub fn add(record: Record) -> Self {
        Self::new(DiffOp::Add, record)
    }

    pub fn delete(record: Record) -> Self {
        Self::new(DiffOp::Delete, record)
    }

    pub fn exists(record: Record) -> Self {
        Self::new(DiffOp::Exists, record)
    }

    pub fn op(&self) -> DiffOp {
        self.op
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn owner(&self) -> &Name {
        self.record.owner()
    }

    pub fn rtype(&self) -> Rtype {
        self.record.rtype()
    }

    pub fn ttl(&self) -> u32 {
        self.record.ttl()
    }

    /// Returns the tuple undoing this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        DiffTuple {
            op: self.op.inverse(),
            record: self.record.clone(),
        }
    }

    /// Returns whether `other` undoes this tuple exactly.
    fn cancels(&self, other: &DiffTuple) -> bool {
        self.op != other.op
            && self.op != DiffOp::Exists
            && other.op != DiffOp::Exists
            && self.record.eq_exact(&other.record)
    }
}

impl fmt::Display for DiffTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.op, self.record)
    }
}

/// Orders records by owner name, type, and canonical record data.
pub fn canonical_order(left: &Record, right: &Record) -> Ordering {
    left.owner()
        .cmp(right.owner())
        .then_with(|| left.rtype().cmp(&right.rtype()))
        .then_with(|| {
            rdata::canonical_cmp(left.rtype(), left.data(), right.data())
        })
}

//------------ Diff ----------------------------------------------------------

/// An ordered list of changes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Diff {
    tuples: Vec<DiffTuple>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiffTuple> {
        self.tuples.iter()
    }

    pub fn tuples(&self) -> &[DiffTuple] {
        &self.tuples
    }

    /// Appends a tuple as is.
    pub fn push(&mut self, tuple: DiffTuple) {
        self.tuples.push(tuple)
    }

    /// Appends a tuple, cancelling it against an earlier opposite one.
    ///
    /// If the diff already contains a tuple that the new one exactly
    /// undoes, both disappear. This keeps a transaction that adds and
    /// later deletes the same record from leaving traces in the journal.
    pub fn append_minimal(&mut self, tuple: DiffTuple) {
        if let Some(pos) = self.tuples.iter().position(|t| t.cancels(&tuple))
        {
            trace!("Cancelling {} against {}", tuple, self.tuples[pos]);
            self.tuples.remove(pos);
        } else {
            self.tuples.push(tuple)
        }
    }

    /// Applies a tuple to an open version and records it.
    ///
    /// Tuples that do not change the version are not recorded.
    pub fn apply(
        &mut self,
        db: &dyn ZoneDatabase,
        version: Version,
        tuple: DiffTuple,
    ) -> Result<(), DbError> {
        if db.apply(version, &tuple)? {
            self.append_minimal(tuple);
        }
        Ok(())
    }

    /// Applies all tuples of `other` and records them.
    pub fn apply_all(
        &mut self,
        db: &dyn ZoneDatabase,
        version: Version,
        other: Diff,
    ) -> Result<(), DbError> {
        for tuple in other {
            self.apply(db, version, tuple)?;
        }
        Ok(())
    }

    /// Sorts the tuples in canonical order.
    pub fn sort(&mut self) {
        self.tuples
            .sort_by(|left, right| canonical_order(&left.record, &right.record))
    }

    /// Removes and returns all tuples matching the predicate.
    pub fn extract(&mut self, mut op: impl FnMut(&DiffTuple) -> bool) -> Diff {
        let (extracted, kept): (Vec<_>, Vec<_>) =
            self.tuples.drain(..).partition(|tuple| op(tuple));
        self.tuples = kept;
        Diff { tuples: extracted }
    }

    /// Returns the diff undoing this one.
    ///
    /// The tuples are inverted and their order is reversed.
    #[must_use]
    pub fn inverse(&self) -> Diff {
        Diff {
            tuples: self.tuples.iter().rev().map(DiffTuple::inverse).collect(),
        }
    }
}

//--- FromIterator, Extend, and IntoIterator

impl FromIterator<DiffTuple> for Diff {
    fn from_iter<I: IntoIterator<Item = DiffTuple>>(iter: I) -> Self {
        Diff {
            tuples: iter.into_iter().collect(),
        }
    }
}

impl Extend<DiffTuple> for Diff {
    fn extend<I: IntoIterator<Item = DiffTuple>>(&mut self, iter: I) {
        self.tuples.extend(iter)
    }
}

impl IntoIterator for Diff {
    type Item = DiffTuple;
    type IntoIter = std::vec::IntoIter<DiffTuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a DiffTuple;
    type IntoIter = std::slice::Iter<'a, DiffTuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

//--- Display

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for tuple in &self.tuples {
            writeln!(f, "{}", tuple)?;
        }
        Ok(())
    }
}

//============ Testing =======================================================
