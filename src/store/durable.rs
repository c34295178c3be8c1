//! Generic framed record store over byte-addressable media.
//!
//! Each record occupies a fixed region of the media:
//!
//! ```text
//! ┌────────────┬───────────┬──────────┬───────────┬──────────────┐
//! │ magic: u32 │ ver: u16  │ len: u16 │ hash: u32 │ body (len B) │
//! └────────────┴───────────┴──────────┴───────────┴──────────────┘
//! ```
//!
//! The body is the postcard encoding of the record type; the hash is the
//! leading four bytes of a SHA-256 digest over the body.  On load, any
//! validation failure (wrong magic, wrong version, length past the region,
//! hash mismatch, undecodable body) falls back to factory defaults, which
//! are immediately persisted so a transient glitch cannot permanently wedge
//! the device.
//!
//! Writes are debounced: in-RAM updates mark the store dirty, and the store
//! writes through only once the record has been dirty for its configured
//! delay.  Rapid bursts of updates coalesce into a single media write,
//! which matters on FRAM whose write endurance is high but whose bus time
//! is not free during a 1 Hz control loop.

use log::warn;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;

/// Byte-addressable persistent media (FRAM, EEPROM, an in-memory image in
/// tests).  Offsets are absolute within the device.
pub trait RecordMedia {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError>;
    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError>;
}

impl<M: RecordMedia> RecordMedia for &mut M {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        (**self).write_at(offset, data)
    }
}

/// A record type that can live in a [`DurableRecordStore`].
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Distinct per record type so a record read from the wrong offset is
    /// rejected rather than misinterpreted.
    const MAGIC: u32;
    /// Bump on any layout change; old layouts reset to factory defaults.
    const VERSION: u16;

    /// Factory-default contents, used on first boot and after corruption.
    fn factory() -> Self;
}

/// Frame header size on media.
pub const HEADER_LEN: usize = 12;

/// Result of [`DurableRecordStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A valid record was read from media.
    Loaded,
    /// Validation failed; factory defaults were written back.
    Initialized(ResetReason),
}

/// Why a load fell back to factory defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    BadMagic,
    VersionMismatch,
    LengthOverflow,
    HashMismatch,
    DecodeFailed,
    /// Structurally valid, but a field failed its semantic range check.
    FieldOutOfRange,
}

struct RecordHeader {
    magic: u32,
    version: u16,
    len: u16,
    hash: u32,
}

impl RecordHeader {
    fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut b = [0u8; HEADER_LEN];
        b[0..4].copy_from_slice(&self.magic.to_le_bytes());
        b[4..6].copy_from_slice(&self.version.to_le_bytes());
        b[6..8].copy_from_slice(&self.len.to_le_bytes());
        b[8..12].copy_from_slice(&self.hash.to_le_bytes());
        b
    }

    fn from_bytes(b: &[u8; HEADER_LEN]) -> Self {
        Self {
            magic: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            version: u16::from_le_bytes([b[4], b[5]]),
            len: u16::from_le_bytes([b[6], b[7]]),
            hash: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
        }
    }
}

fn body_hash(body: &[u8]) -> u32 {
    let digest = hmac_sha256::Hash::hash(body);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// One framed record plus its debounced write-back state.
///
/// The store does not own its media; every media-touching method takes it
/// as a parameter so two stores can share one FRAM chip.
pub struct DurableRecordStore<R: Record> {
    offset: usize,
    region_size: usize,
    save_delay_ms: u32,
    record: R,
    dirty_since_ms: Option<u64>,
}

impl<R: Record> DurableRecordStore<R> {
    pub fn new(offset: usize, region_size: usize, save_delay_ms: u32) -> Self {
        debug_assert!(region_size > HEADER_LEN);
        Self {
            offset,
            region_size,
            save_delay_ms,
            record: R::factory(),
            dirty_since_ms: None,
        }
    }

    /// Read and validate the record from media.  On any validation failure
    /// the in-RAM copy resets to factory defaults and is written back
    /// immediately.
    pub fn load<M: RecordMedia>(&mut self, media: &mut M) -> Result<LoadOutcome, StoreError> {
        match self.try_read(media)? {
            Ok(record) => {
                self.record = record;
                self.dirty_since_ms = None;
                Ok(LoadOutcome::Loaded)
            }
            Err(reason) => {
                warn!(
                    "record 0x{:08x} invalid ({reason:?}), resetting to factory defaults",
                    R::MAGIC
                );
                self.record = R::factory();
                self.write_now(media)?;
                self.dirty_since_ms = None;
                Ok(LoadOutcome::Initialized(reason))
            }
        }
    }

    fn try_read<M: RecordMedia>(
        &self,
        media: &M,
    ) -> Result<core::result::Result<R, ResetReason>, StoreError> {
        let mut hdr_buf = [0u8; HEADER_LEN];
        media.read_at(self.offset, &mut hdr_buf)?;
        let hdr = RecordHeader::from_bytes(&hdr_buf);

        if hdr.magic != R::MAGIC {
            return Ok(Err(ResetReason::BadMagic));
        }
        if hdr.version != R::VERSION {
            return Ok(Err(ResetReason::VersionMismatch));
        }
        let len = hdr.len as usize;
        if len > self.region_size - HEADER_LEN {
            return Ok(Err(ResetReason::LengthOverflow));
        }

        let mut body = vec![0u8; len];
        media.read_at(self.offset + HEADER_LEN, &mut body)?;
        if body_hash(&body) != hdr.hash {
            return Ok(Err(ResetReason::HashMismatch));
        }

        match postcard::from_bytes(&body) {
            Ok(record) => Ok(Ok(record)),
            Err(_) => Ok(Err(ResetReason::DecodeFailed)),
        }
    }

    /// Reset to factory defaults and persist immediately.  Used by callers
    /// whose own (semantic) validation fails after a structurally valid
    /// load.
    pub fn reinitialize<M: RecordMedia>(&mut self, media: &mut M) -> Result<(), StoreError> {
        warn!(
            "record 0x{:08x} failed field validation, resetting to factory defaults",
            R::MAGIC
        );
        self.record = R::factory();
        self.write_now(media)?;
        self.dirty_since_ms = None;
        Ok(())
    }

    /// Immutable view of the in-RAM record.
    pub fn get(&self) -> &R {
        &self.record
    }

    /// Mutate the in-RAM record and mark it dirty.  The media write happens
    /// later, from [`flush_if_due`](Self::flush_if_due).
    pub fn update(&mut self, now_ms: u64, f: impl FnOnce(&mut R)) {
        f(&mut self.record);
        if self.dirty_since_ms.is_none() {
            self.dirty_since_ms = Some(now_ms);
        }
    }

    /// Replace the record wholesale (factory reset path).
    pub fn replace(&mut self, now_ms: u64, record: R) {
        self.record = record;
        if self.dirty_since_ms.is_none() {
            self.dirty_since_ms = Some(now_ms);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since_ms.is_some()
    }

    /// Write through if the record has been dirty for at least the save
    /// delay.  Returns whether a media write happened.
    pub fn flush_if_due<M: RecordMedia>(
        &mut self,
        media: &mut M,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        match self.dirty_since_ms {
            Some(since) if now_ms.saturating_sub(since) >= u64::from(self.save_delay_ms) => {
                self.write_now(media)?;
                self.dirty_since_ms = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write through immediately if dirty, ignoring the debounce window.
    /// Called before sleep and reset so no update is lost.
    pub fn flush_now<M: RecordMedia>(&mut self, media: &mut M) -> Result<bool, StoreError> {
        if self.dirty_since_ms.is_some() {
            self.write_now(media)?;
            self.dirty_since_ms = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn write_now<M: RecordMedia>(&self, media: &mut M) -> Result<(), StoreError> {
        let body = postcard::to_allocvec(&self.record).map_err(|_| StoreError::RegionOverflow)?;
        if body.len() > self.region_size - HEADER_LEN {
            return Err(StoreError::RegionOverflow);
        }
        let hdr = RecordHeader {
            magic: R::MAGIC,
            version: R::VERSION,
            len: body.len() as u16,
            hash: body_hash(&body),
        };
        media.write_at(self.offset, &hdr.to_bytes())?;
        media.write_at(self.offset + HEADER_LEN, &body)?;
        Ok(())
    }
}
