//! Primitive reading and writing for the binary packet format.
//!
//! The format is little-endian throughout. A packet on the wire is a
//! 7-byte header followed by its payload:
//!
//! ```text
//! ┌──────────────┬──────────┬────────────────┬─────────────────┐
//! │ type id: u16 │ 0x00: u8 │ length: i32    │ payload (length)│
//! └──────────────┴──────────┴────────────────┴─────────────────┘
//! ```
//!
//! Strings are written as a presence marker (`0x0b`), a ULEB128 byte count
//! and the raw bytes. Anything other than `0x0b` in marker position means
//! "no string" and decodes to `""`.
//!
//! [`PacketWriter`] is total: writing can't fail, so its methods return
//! `&mut Self` for chaining. [`PacketReader`] reads from a fixed window and
//! reports [`ProtocolError::Truncated`] as soon as a read would run past it.

use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::ProtocolError;

/// Marker byte that precedes every present string.
pub const STRING_MARKER: u8 = 0x0b;

/// Size of the frame header: type id, reserved byte, length.
pub const FRAME_HEADER_LEN: usize = 7;

// ---------------------------------------------------------------------------
// PacketReader
// ---------------------------------------------------------------------------

/// A cursor over one byte window (usually one packet payload).
pub struct PacketReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PacketReader<'a> {
    pub fn new(window: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(window),
        }
    }

    /// Bytes left between the cursor and the end of the window.
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }

    fn ensure(&self, wanted: usize) -> Result<(), ProtocolError> {
        let remaining = self.remaining();
        if wanted > remaining {
            return Err(ProtocolError::Truncated { wanted, remaining });
        }
        Ok(())
    }

    /// Runs a fixed-width read after checking the window holds `wanted`
    /// more bytes.
    fn read_fixed<T>(
        &mut self,
        wanted: usize,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T, ProtocolError> {
        self.ensure(wanted)?;
        let remaining = self.remaining();
        read(&mut self.cursor)
            .map_err(|_| ProtocolError::Truncated { wanted, remaining })
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.read_fixed(1, |c| c.read_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        self.read_fixed(1, |c| c.read_i8())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.read_fixed(2, |c| c.read_u16::<LittleEndian>())
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.read_fixed(2, |c| c.read_i16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.read_fixed(4, |c| c.read_u32::<LittleEndian>())
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.read_fixed(4, |c| c.read_i32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.read_fixed(8, |c| c.read_u64::<LittleEndian>())
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.read_fixed(8, |c| c.read_i64::<LittleEndian>())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.read_fixed(4, |c| c.read_f32::<LittleEndian>())
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        self.read_fixed(8, |c| c.read_f64::<LittleEndian>())
    }

    /// Borrows the next `len` bytes of the window.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.ensure(len)?;
        let start = self.cursor.position() as usize;
        let window: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&window[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads an unsigned LEB128 integer (7 bits per byte, high bit set on
    /// every byte but the last).
    pub fn read_uleb128(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(ProtocolError::VarIntOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Reads a string. A missing marker yields `""`; invalid UTF-8 sequences
    /// are dropped rather than reported.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        if self.read_u8()? != STRING_MARKER {
            return Ok(String::new());
        }
        let len = self.read_uleb128()?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::VarIntOverflow)?;
        let bytes = self.read_bytes(len)?;
        Ok(decode_lossy(bytes))
    }

    /// Reads a `u16` count followed by that many `u32` values.
    pub fn read_u32_list(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let count = self.read_u16()? as usize;
        self.ensure(count * 4)?;
        (0..count).map(|_| self.read_u32()).collect()
    }
}

/// Keeps every valid UTF-8 run and silently drops the rest.
fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Accumulates one packet payload.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.put(|buf| buf.write_i8(value))
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.put(|buf| buf.write_u16::<LittleEndian>(value))
    }

    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.put(|buf| buf.write_i16::<LittleEndian>(value))
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.put(|buf| buf.write_u32::<LittleEndian>(value))
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.put(|buf| buf.write_i32::<LittleEndian>(value))
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.put(|buf| buf.write_u64::<LittleEndian>(value))
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.put(|buf| buf.write_i64::<LittleEndian>(value))
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.put(|buf| buf.write_f32::<LittleEndian>(value))
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.put(|buf| buf.write_f64::<LittleEndian>(value))
    }

    // Writes into a Vec<u8> never fail.
    fn put(&mut self, write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> &mut Self {
        let _ = write(&mut self.buf);
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_uleb128(&mut self, mut value: u64) -> &mut Self {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return self;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Writes a present string. `""` becomes `0x0b 0x00`.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.buf.push(STRING_MARKER);
        self.write_uleb128(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Writes the single `0x00` byte that stands for "no string".
    pub fn write_absent_string(&mut self) -> &mut Self {
        self.write_u8(0)
    }

    pub fn write_u32_list(&mut self, values: &[u32]) -> &mut Self {
        self.write_u16(values.len() as u16);
        for value in values {
            self.write_u32(*value);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The payload written so far, without a frame header.
    pub fn into_payload(self) -> Vec<u8> {
        self.buf
    }

    /// Wraps the payload in a frame header for `packet_id`.
    pub fn finish(&self, packet_id: impl Into<u16>) -> Vec<u8> {
        frame(packet_id.into(), &self.buf)
    }
}

/// Builds one complete frame.
pub fn frame(packet_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut w = PacketWriter {
        buf: Vec::with_capacity(FRAME_HEADER_LEN + payload.len()),
    };
    w.write_u16(packet_id)
        .write_u8(0)
        .write_i32(payload.len() as i32)
        .write_bytes(payload);
    w.buf
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// One decoded frame, borrowing its payload from the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub packet_id: u16,
    pub payload: &'a [u8],
}

/// Splits an inbound batch into frames.
///
/// Yields `Err` at most once: after a malformed header the rest of the batch
/// can't be trusted, so iteration ends there.
pub struct FrameReader<'a> {
    reader: PacketReader<'a>,
    done: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(batch: &'a [u8]) -> Self {
        Self {
            reader: PacketReader::new(batch),
            done: false,
        }
    }

    fn next_frame(&mut self) -> Result<Frame<'a>, ProtocolError> {
        let packet_id = self.reader.read_u16()?;
        self.reader.skip(1)?;
        let length = self.reader.read_i32()?;
        let len = usize::try_from(length)
            .ok()
            .filter(|len| *len <= self.reader.remaining())
            .ok_or(ProtocolError::InvalidFrameLength { packet_id, length })?;
        let payload = self.reader.read_bytes(len)?;
        Ok(Frame { packet_id, payload })
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Result<Frame<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.remaining() == 0 {
            return None;
        }
        let frame = self.next_frame();
        if frame.is_err() {
            self.done = true;
        }
        Some(frame)
    }
}
