//! Typed access to guest linear memory.
//!
//! A [`MemoryView`] borrows the guest's memory for the duration of a single
//! host call. The memory can grow (and move) whenever the guest runs, so a
//! view must never outlive the call it was created for; the runtime builds a
//! fresh one from `Memory::data_and_store_mut` on every dispatch.
//!
//! ## Layout Convention
//!
//! - Pointers are byte offsets into linear memory (wasm32 `i32`, read as `u32`)
//! - All scalars are little-endian
//! - Strings are NUL-terminated, one byte per character (Latin-1, not UTF-8)

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{BridgeError, Result};

/// A byte offset into guest linear memory.
pub type GuestPtr = u32;

/// Borrowed view over guest linear memory.
pub struct MemoryView<'a> {
    bytes: &'a mut [u8],
}

impl<'a> MemoryView<'a> {
    /// Wrap the current memory contents.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Current size of linear memory in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, ptr: GuestPtr, len: usize) -> Result<std::ops::Range<usize>> {
        let start = ptr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(BridgeError::MemoryOutOfBounds {
                offset: ptr as u64,
                len: len as u64,
                size: self.bytes.len() as u64,
            }),
        }
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&self, ptr: GuestPtr) -> Result<u32> {
        let r = self.range(ptr, 4)?;
        Ok(LittleEndian::read_u32(&self.bytes[r]))
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&self, ptr: GuestPtr) -> Result<i32> {
        let r = self.range(ptr, 4)?;
        Ok(LittleEndian::read_i32(&self.bytes[r]))
    }

    /// Read a little-endian `f32`.
    pub fn read_f32(&self, ptr: GuestPtr) -> Result<f32> {
        let r = self.range(ptr, 4)?;
        Ok(LittleEndian::read_f32(&self.bytes[r]))
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&self, ptr: GuestPtr) -> Result<u64> {
        let r = self.range(ptr, 8)?;
        Ok(LittleEndian::read_u64(&self.bytes[r]))
    }

    /// Write a little-endian `u32`.
    pub fn write_u32(&mut self, ptr: GuestPtr, value: u32) -> Result<()> {
        let r = self.range(ptr, 4)?;
        LittleEndian::write_u32(&mut self.bytes[r], value);
        Ok(())
    }

    /// Write a little-endian `i32`.
    pub fn write_i32(&mut self, ptr: GuestPtr, value: i32) -> Result<()> {
        let r = self.range(ptr, 4)?;
        LittleEndian::write_i32(&mut self.bytes[r], value);
        Ok(())
    }

    /// Write a little-endian `f32`.
    pub fn write_f32(&mut self, ptr: GuestPtr, value: f32) -> Result<()> {
        let r = self.range(ptr, 4)?;
        LittleEndian::write_f32(&mut self.bytes[r], value);
        Ok(())
    }

    /// Write a little-endian `u64`.
    pub fn write_u64(&mut self, ptr: GuestPtr, value: u64) -> Result<()> {
        let r = self.range(ptr, 8)?;
        LittleEndian::write_u64(&mut self.bytes[r], value);
        Ok(())
    }

    /// Borrow `len` bytes starting at `ptr`.
    pub fn slice(&self, ptr: GuestPtr, len: usize) -> Result<&[u8]> {
        let r = self.range(ptr, len)?;
        Ok(&self.bytes[r])
    }

    /// Mutably borrow `len` bytes starting at `ptr`.
    pub fn slice_mut(&mut self, ptr: GuestPtr, len: usize) -> Result<&mut [u8]> {
        let r = self.range(ptr, len)?;
        Ok(&mut self.bytes[r])
    }

    /// Borrow everything from `ptr` to the end of memory.
    pub fn tail(&self, ptr: GuestPtr) -> Result<&[u8]> {
        let len = self.bytes.len().saturating_sub(ptr as usize);
        self.slice(ptr, len)
    }

    /// Copy host bytes into guest memory at `ptr`.
    pub fn copy_in(&mut self, ptr: GuestPtr, src: &[u8]) -> Result<()> {
        let r = self.range(ptr, src.len())?;
        self.bytes[r].copy_from_slice(src);
        Ok(())
    }

    /// Read `count` consecutive `u32` values (pointer arrays, handle arrays).
    pub fn read_u32_array(&self, ptr: GuestPtr, count: usize) -> Result<Vec<u32>> {
        let bytes = self.slice(ptr, count.saturating_mul(4))?;
        Ok(bytes.chunks_exact(4).map(LittleEndian::read_u32).collect())
    }

    /// Decode a NUL-terminated string, one byte per character.
    ///
    /// Without a terminator the string runs to the end of memory.
    pub fn read_cstr(&self, ptr: GuestPtr) -> Result<String> {
        let bytes = self.tail(ptr)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].iter().map(|&b| b as char).collect())
    }

    /// Encode `text` at `ptr` followed by a NUL byte and return `ptr`.
    ///
    /// Each character is truncated to its low byte. There is no capacity
    /// check against the destination buffer: the caller sizes it. Bytes that
    /// would land past the end of linear memory are discarded.
    pub fn write_cstr(&mut self, ptr: GuestPtr, text: &str) -> GuestPtr {
        let start = ptr as usize;
        let encoded = text.chars().map(|c| c as u32 as u8).chain(std::iter::once(0));
        for (i, b) in encoded.enumerate() {
            match self.bytes.get_mut(start + i) {
                Some(slot) => *slot = b,
                None => break,
            }
        }
        ptr
    }
}
