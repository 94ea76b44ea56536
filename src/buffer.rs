//! Chunked binary buffer with little-endian typed values
//!
//! A `DBuffer` is either an output buffer (a growing list of fixed-size
//! parts) or an input buffer (one contiguous block read through a cursor).
//! The mode is chosen once; the only transition is output -> input.
//!
//! Wire encodings:
//! - `bool`: 1 byte
//! - `i32`, `u32`, `f32`, `u16`: little-endian, native width
//! - `u64`: 4 bytes, the low 32 bits (the replay wire width)
//! - string: `u32` length prefix then raw bytes, 1..=511 bytes

use crate::error::{Error, Result};

/// Strings must be strictly shorter than this
pub const MAX_STRING_LEN: usize = 512;

/// Default size of an output part
pub const DEFAULT_PART_SIZE: usize = 1024;

#[derive(Debug, Clone, Default)]
enum Mode {
    #[default]
    Unset,
    Output {
        part_size: usize,
        parts: Vec<Vec<u8>>,
    },
    Input {
        data: Vec<u8>,
        cursor: usize,
    },
}

/// Growable output / bounds-checked input byte buffer
#[derive(Debug, Clone, Default)]
pub struct DBuffer {
    mode: Mode,
}

impl DBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer already in output mode
    pub fn output(part_size: usize) -> Self {
        let mut buffer = Self::new();
        buffer.init_output(part_size);
        buffer
    }

    /// Create a buffer already in input mode over `data`
    pub fn input(data: Vec<u8>) -> Self {
        let mut buffer = Self::new();
        buffer.init_input(data);
        buffer
    }

    /// Switch to output mode, dropping any previous content
    pub fn init_output(&mut self, part_size: usize) {
        self.mode = Mode::Output {
            part_size: part_size.max(1),
            parts: Vec::new(),
        };
    }

    /// Switch to input mode over `data`, cursor at 0
    pub fn init_input(&mut self, data: Vec<u8>) {
        self.mode = Mode::Input { data, cursor: 0 };
    }

    pub fn is_output(&self) -> bool {
        matches!(self.mode, Mode::Output { .. })
    }

    pub fn is_input(&self) -> bool {
        matches!(self.mode, Mode::Input { .. })
    }

    /// Total number of bytes held (written in output mode, owned in input mode)
    pub fn total_size(&self) -> usize {
        match &self.mode {
            Mode::Unset => 0,
            Mode::Output { parts, .. } => parts.iter().map(Vec::len).sum(),
            Mode::Input { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_size() == 0
    }

    /// Bytes left to read. Always 0 outside input mode.
    pub fn num_remaining_bytes(&self) -> usize {
        match &self.mode {
            Mode::Input { data, cursor } => data.len() - cursor,
            _ => 0,
        }
    }

    /// Append raw bytes, opening new parts as the current one fills up.
    /// Ignored unless the buffer is in output mode.
    pub fn write_buf(&mut self, mut src: &[u8]) {
        let Mode::Output { part_size, parts } = &mut self.mode else {
            return;
        };
        while !src.is_empty() {
            let needs_part = parts.last().is_none_or(|p| p.len() >= *part_size);
            if needs_part {
                parts.push(Vec::with_capacity(*part_size));
            }
            let Some(part) = parts.last_mut() else {
                return;
            };
            let n = (*part_size - part.len()).min(src.len());
            part.extend_from_slice(&src[..n]);
            src = &src[n..];
        }
    }

    /// Fill `dest` from the cursor
    pub fn read_buf(&mut self, dest: &mut [u8]) -> Result<()> {
        let remaining = self.num_remaining_bytes();
        let Mode::Input { data, cursor } = &mut self.mode else {
            return Err(Error::BufferUnderrun {
                requested: dest.len(),
                remaining,
            });
        };
        if remaining < dest.len() {
            return Err(Error::BufferUnderrun {
                requested: dest.len(),
                remaining,
            });
        }
        dest.copy_from_slice(&data[*cursor..*cursor + dest.len()]);
        *cursor += dest.len();
        Ok(())
    }

    /// Read `n` bytes into a fresh vector
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let remaining = self.num_remaining_bytes();
        if remaining < n {
            return Err(Error::BufferUnderrun {
                requested: n,
                remaining,
            });
        }
        let mut out = vec![0u8; n];
        self.read_buf(&mut out)?;
        Ok(out)
    }

    /// Flatten all parts into a contiguous input buffer. No-op outside output mode.
    pub fn convert_output_to_input(&mut self) {
        if let Mode::Output { parts, .. } = &mut self.mode {
            let data = std::mem::take(parts).concat();
            self.mode = Mode::Input { data, cursor: 0 };
        }
    }

    /// Copy the whole content into `dest`, returning the number of bytes copied
    pub fn copy_to(&self, dest: &mut [u8]) -> Result<usize> {
        let needed = self.total_size();
        if dest.len() < needed {
            return Err(Error::DestinationTooSmall {
                needed,
                available: dest.len(),
            });
        }
        let mut offset = 0;
        match &self.mode {
            Mode::Unset => {}
            Mode::Output { parts, .. } => {
                for part in parts {
                    dest[offset..offset + part.len()].copy_from_slice(part);
                    offset += part.len();
                }
            }
            Mode::Input { data, .. } => {
                dest[..data.len()].copy_from_slice(data);
                offset = data.len();
            }
        }
        Ok(offset)
    }

    /// The whole content as one vector
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.mode {
            Mode::Unset => Vec::new(),
            Mode::Output { parts, .. } => parts.concat(),
            Mode::Input { data, .. } => data.clone(),
        }
    }

    /// Drop all content and return to the unset mode
    pub fn clear(&mut self) {
        self.mode = Mode::Unset;
    }

    // === Typed values ===

    pub fn write_bool(&mut self, v: bool) {
        self.write_buf(&[u8::from(v)]);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_buf(&[v]);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write_buf(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_buf(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_buf(&v.to_le_bytes());
    }

    /// Values above `u32::MAX` lose their high bits
    pub fn write_u64(&mut self, v: u64) {
        self.write_buf(&(v as u32).to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_buf(&v.to_le_bytes());
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        if len == 0 || len >= MAX_STRING_LEN {
            return Err(Error::InvalidStringLength(len as i64));
        }
        self.write_u32(len as u32);
        self.write_buf(s.as_bytes());
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_buf(&mut b)?;
        Ok(b[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        self.read_buf(&mut b)?;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from(self.read_u32()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len <= 0 || len as usize >= MAX_STRING_LEN {
            return Err(Error::InvalidStringLength(len as i64));
        }
        let bytes = self.read_bytes(len as usize)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
