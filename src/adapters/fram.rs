//! FRAM media adapters.
//!
//! The records live on an external I2C FRAM (MB85RC64 class): byte
//! addressable, effectively unlimited write endurance, no page-erase
//! latency.  [`I2cFram`] speaks the two-byte-address protocol over any
//! `embedded-hal` I2C bus; [`SimFram`] is the host-side stand-in backed by
//! a plain byte image.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;

use crate::error::StoreError;
use crate::store::RecordMedia;

/// Seven-bit bus address of the FRAM (A0..A2 strapped low).
pub const FRAM_I2C_ADDR: u8 = 0x50;

/// Largest data chunk per write transaction, keeping the on-stack
/// transaction buffer small.
const WRITE_CHUNK: usize = 30;

// ───────────────────────────────────────────────────────────────
// I2C FRAM
// ───────────────────────────────────────────────────────────────

/// MB85RC64-class FRAM behind an `embedded-hal` I2C bus.
///
/// Reads take `&self` at the media boundary, so the bus lives in a
/// `RefCell`; the control loop is single-threaded and never holds two
/// borrows at once.
pub struct I2cFram<I2C> {
    bus: RefCell<I2C>,
    addr: u8,
    capacity: usize,
}

impl<I2C: I2c> I2cFram<I2C> {
    pub fn new(bus: I2C, addr: u8, capacity: usize) -> Self {
        Self {
            bus: RefCell::new(bus),
            addr,
            capacity,
        }
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), StoreError> {
        if offset.saturating_add(len) > self.capacity {
            return Err(StoreError::MediaIo);
        }
        Ok(())
    }
}

impl<I2C: I2c> RecordMedia for I2cFram<I2C> {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        self.check_bounds(offset, buf.len())?;
        let addr_bytes = [(offset >> 8) as u8, offset as u8];
        self.bus
            .borrow_mut()
            .write_read(self.addr, &addr_bytes, buf)
            .map_err(|_| StoreError::MediaIo)
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        self.check_bounds(offset, data.len())?;
        let bus = self.bus.get_mut();
        let mut pos = 0;
        while pos < data.len() {
            let end = usize::min(pos + WRITE_CHUNK, data.len());
            let at = offset + pos;
            let mut frame = [0u8; WRITE_CHUNK + 2];
            frame[0] = (at >> 8) as u8;
            frame[1] = at as u8;
            frame[2..2 + (end - pos)].copy_from_slice(&data[pos..end]);
            bus.write(self.addr, &frame[..2 + (end - pos)])
                .map_err(|_| StoreError::MediaIo)?;
            pos = end;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// In-memory FRAM image for host builds and integration tests.  Fresh
/// images read as erased (0xFF), matching a factory part.
pub struct SimFram {
    image: Vec<u8>,
}

impl SimFram {
    pub fn new(capacity: usize) -> Self {
        Self {
            image: vec![0xFF; capacity],
        }
    }

    /// Rebuild from a previously captured image, for restart scenarios.
    pub fn from_image(image: Vec<u8>) -> Self {
        Self { image }
    }

    /// Snapshot of the current image.
    pub fn image(&self) -> Vec<u8> {
        self.image.clone()
    }

    /// Flip bits at `offset`, simulating media corruption.
    pub fn corrupt(&mut self, offset: usize) {
        self.image[offset] ^= 0xA5;
    }
}

impl RecordMedia for SimFram {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let end = offset.saturating_add(buf.len());
        if end > self.image.len() {
            return Err(StoreError::MediaIo);
        }
        buf.copy_from_slice(&self.image[offset..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        let end = offset.saturating_add(data.len());
        if end > self.image.len() {
            return Err(StoreError::MediaIo);
        }
        self.image[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_fram_rejects_out_of_bounds() {
        let mut f = SimFram::new(64);
        let mut buf = [0u8; 8];
        assert!(f.read_at(60, &mut buf).is_err());
        assert!(f.write_at(60, &[0u8; 8]).is_err());
        assert!(f.write_at(56, &[1u8; 8]).is_ok());
    }

    #[test]
    fn sim_fram_image_roundtrips_restarts() {
        let mut f = SimFram::new(64);
        f.write_at(10, &[1, 2, 3]).unwrap();
        let f2 = SimFram::from_image(f.image());
        let mut buf = [0u8; 3];
        f2.read_at(10, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }
}
