//! The transaction journal.
//!
//! Every committed update is appended to the zone's journal before the new
//! zone version becomes visible. The journal is an append-only sequence of
//! transactions, each of which is the diff of one update together with the
//! serials of the versions before and after it.
//!
//! [`FileJournal`] keeps the journal in a file, [`MemoryJournal`] keeps it
//! in memory.

use core::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::update::diff::{Diff, DiffOp, DiffTuple};

//------------ Journal -------------------------------------------------------

/// A place to durably record update transactions.
pub trait Journal: Send + Sync {
    /// Opens the journal for appending transactions.
    fn open_for_append(
        &self,
    ) -> Result<Box<dyn JournalHandle + '_>, JournalError>;
}

/// A journal opened for appending.
pub trait JournalHandle {
    /// Appends a transaction.
    ///
    /// `from` and `to` are the serials of the zone before and after the
    /// transaction.
    fn write_transaction(
        &mut self,
        diff: &Diff,
        from: Serial,
        to: Serial,
    ) -> Result<(), JournalError>;

    /// Makes all written transactions durable and closes the journal.
    fn close(self: Box<Self>) -> Result<(), JournalError>;
}

//------------ JournalTransaction --------------------------------------------

/// A transaction read back from a journal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JournalTransaction {
    pub from: Serial,
    pub to: Serial,
    pub diff: Diff,
}

impl JournalTransaction {
    /// Appends the wire format of a transaction to a buffer.
    ///
    /// The format is a 32 bit length of the rest, the two serials, a 32 bit
    /// tuple count and then each tuple as its operation octet followed by
    /// the uncompressed record.
    fn compose(diff: &Diff, from: Serial, to: Serial, buf: &mut BytesMut) {
        let mut body = BytesMut::new();
        body.put_u32(from.into_int());
        body.put_u32(to.into_int());
        body.put_u32(diff.len() as u32);
        for tuple in diff {
            body.put_u8(match tuple.op() {
                DiffOp::Add => OP_ADD,
                DiffOp::Delete => OP_DELETE,
                DiffOp::Exists => OP_EXISTS,
            });
            let record = tuple.record();
            body.put_slice(record.owner().as_slice());
            body.put_u16(record.rtype().to_int());
            body.put_u16(record.class().to_int());
            body.put_u32(record.ttl());
            body.put_u16(record.data().len() as u16);
            body.put_slice(record.data());
        }
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
    }

    /// Parses the body of a transaction, i.e., without the length.
    fn parse(mut body: Bytes) -> Result<Self, JournalError> {
        if body.remaining() < 12 {
            return Err(JournalError::Format("short transaction header"));
        }
        let from = Serial(body.get_u32());
        let to = Serial(body.get_u32());
        let count = body.get_u32();
        let mut diff = Diff::new();
        for _ in 0..count {
            if !body.has_remaining() {
                return Err(JournalError::Format("short transaction"));
            }
            let op = match body.get_u8() {
                OP_ADD => DiffOp::Add,
                OP_DELETE => DiffOp::Delete,
                OP_EXISTS => DiffOp::Exists,
                _ => return Err(JournalError::Format("unknown operation")),
            };
            let (owner, len) = Name::parse_prefix(&body)
                .map_err(|_| JournalError::Format("bad owner name"))?;
            body.advance(len);
            if body.remaining() < 10 {
                return Err(JournalError::Format("short record"));
            }
            let rtype = Rtype::from_int(body.get_u16());
            let class = Class::from_int(body.get_u16());
            let ttl = body.get_u32();
            let rdlen = usize::from(body.get_u16());
            if body.remaining() < rdlen {
                return Err(JournalError::Format("short record data"));
            }
            let data = body.split_to(rdlen);
            diff.push(DiffTuple::new(
                op,
                Record::new(owner, class, rtype, ttl, data),
            ));
        }
        if body.has_remaining() {
            return Err(JournalError::Format("trailing transaction data"));
        }
        Ok(JournalTransaction { from, to, diff })
    }
}

const OP_ADD: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_EXISTS: u8 = 3;

//------------ FileJournal ---------------------------------------------------

/// A journal kept in a file.
#[derive(Clone, Debug)]
pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileJournal { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all transactions in the order they were written.
    ///
    /// A missing file is an empty journal.
    pub fn read_transactions(
        &self,
    ) -> Result<Vec<JournalTransaction>, JournalError> {
        let mut content = Vec::new();
        match File::open(&self.path) {
            Ok(mut file) => {
                file.read_to_end(&mut content)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(err) => return Err(err.into()),
        }
        let mut content = Bytes::from(content);
        let mut res = Vec::new();
        while content.has_remaining() {
            if content.remaining() < 4 {
                return Err(JournalError::Format("short transaction length"));
            }
            let len = content.get_u32() as usize;
            if content.remaining() < len {
                return Err(JournalError::Format("truncated transaction"));
            }
            res.push(JournalTransaction::parse(content.split_to(len))?);
        }
        Ok(res)
    }
}

impl Journal for FileJournal {
    fn open_for_append(
        &self,
    ) -> Result<Box<dyn JournalHandle + '_>, JournalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        trace!("Opened journal {}", self.path.display());
        Ok(Box::new(FileJournalHandle {
            journal: self,
            file,
        }))
    }
}

struct FileJournalHandle<'a> {
    journal: &'a FileJournal,
    file: File,
}

impl JournalHandle for FileJournalHandle<'_> {
    fn write_transaction(
        &mut self,
        diff: &Diff,
        from: Serial,
        to: Serial,
    ) -> Result<(), JournalError> {
        let mut buf = BytesMut::new();
        JournalTransaction::compose(diff, from, to, &mut buf);
        self.file.write_all(&buf)?;
        debug!(
            "Wrote transaction {from} -> {to} ({} changes) to journal {}",
            diff.len(),
            self.journal.path.display()
        );
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), JournalError> {
        self.file.sync_all()?;
        Ok(())
    }
}

//------------ MemoryJournal -------------------------------------------------

/// A journal kept in memory.
///
/// Writes can be made to fail on purpose which is mostly useful for
/// testing how updates deal with journal errors.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    transactions: Mutex<Vec<JournalTransaction>>,
    fail_writes: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all transactions written so far.
    pub fn transactions(&self) -> Vec<JournalTransaction> {
        self.transactions.lock().clone()
    }

    /// Makes all following writes fail or succeed again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed)
    }
}

impl Journal for MemoryJournal {
    fn open_for_append(
        &self,
    ) -> Result<Box<dyn JournalHandle + '_>, JournalError> {
        Ok(Box::new(MemoryJournalHandle {
            journal: self,
            pending: Vec::new(),
        }))
    }
}

struct MemoryJournalHandle<'a> {
    journal: &'a MemoryJournal,
    pending: Vec<JournalTransaction>,
}

impl JournalHandle for MemoryJournalHandle<'_> {
    fn write_transaction(
        &mut self,
        diff: &Diff,
        from: Serial,
        to: Serial,
    ) -> Result<(), JournalError> {
        if self.journal.fail_writes.load(Ordering::Relaxed) {
            return Err(JournalError::Io(Arc::new(io::Error::new(
                io::ErrorKind::Other,
                "journal writes disabled",
            ))));
        }
        self.pending.push(JournalTransaction {
            from,
            to,
            diff: diff.clone(),
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), JournalError> {
        self.journal.transactions.lock().extend(self.pending);
        Ok(())
    }
}

//------------ JournalError --------------------------------------------------

/// Writing or reading the journal failed.
#[derive(Clone, Debug)]
pub enum JournalError {
    /// An I/O error happened.
    Io(Arc<io::Error>),

    /// The journal content is malformed.
    Format(&'static str),
}

impl From<io::Error> for JournalError {
    fn from(err: io::Error) -> Self {
        JournalError::Io(Arc::new(err))
    }
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JournalError::Io(err) => write!(f, "{}", err),
            JournalError::Format(msg) => write!(f, "malformed journal: {}", msg),
        }
    }
}

impl std::error::Error for JournalError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::rdata;
    use core::str::FromStr;
    use std::net::Ipv4Addr;

    fn a(owner: &str, last: u8) -> Record {
        Record::new(
            Name::from_str(owner).unwrap(),
            Class::IN,
            Rtype::A,
            300,
            rdata::a(Ipv4Addr::new(192, 0, 2, last)),
        )
    }

    fn diff() -> Diff {
        [
            DiffTuple::delete(a("host.example", 1)),
            DiffTuple::add(a("Host.example", 2)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn file_journal_keeps_order() {
        let path = std::env::temp_dir().join(format!(
            "domain-update-journal-{}.jnl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let journal = FileJournal::new(&path);
        assert!(journal.read_transactions().unwrap().is_empty());

        for (from, to) in [(1, 2), (2, 3)] {
            let mut handle = journal.open_for_append().unwrap();
            handle
                .write_transaction(&diff(), Serial(from), Serial(to))
                .unwrap();
            handle.close().unwrap();
        }

        let read = journal.read_transactions().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].from, Serial(1));
        assert_eq!(read[1].to, Serial(3));
        assert_eq!(read[0].diff, diff());
        // Owner case survives.
        assert!(read[1].diff.tuples()[1]
            .owner()
            .eq_case(&Name::from_str("Host.example").unwrap()));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_file() {
        let path = std::env::temp_dir().join(format!(
            "domain-update-truncated-{}.jnl",
            std::process::id()
        ));
        let mut buf = BytesMut::new();
        JournalTransaction::compose(&diff(), Serial(1), Serial(2), &mut buf);
        std::fs::write(&path, &buf[..buf.len() - 3]).unwrap();
        assert!(matches!(
            FileJournal::new(&path).read_transactions(),
            Err(JournalError::Format(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn memory_journal() {
        let journal = MemoryJournal::new();
        let mut handle = journal.open_for_append().unwrap();
        handle.write_transaction(&diff(), Serial(1), Serial(2)).unwrap();
        // Nothing is visible before the handle is closed.
        assert!(journal.transactions().is_empty());
        handle.close().unwrap();
        assert_eq!(journal.transactions().len(), 1);

        journal.set_fail_writes(true);
        let mut handle = journal.open_for_append().unwrap();
        assert!(handle
            .write_transaction(&diff(), Serial(2), Serial(3))
            .is_err());
    }
}
