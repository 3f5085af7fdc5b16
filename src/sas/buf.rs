use anyhow::{anyhow, bail, Result};

/// Byte order of the file, from header offset 37.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Bounds-checked integer reads over a raw byte buffer in the file's
/// declared byte order. Every accessor errors with the offending offset
/// instead of panicking, a truncated file is a data error here.
#[derive(Clone, Copy)]
pub struct RawBuf<'a> {
    pub data: &'a [u8],
    pub endian: Endian,
}

impl<'a> RawBuf<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self { data, endian }
    }

    pub fn bytes_at(&self, pos: usize, len: usize) -> Result<&'a [u8]> {
        self.data
            .get(pos..pos.saturating_add(len))
            .ok_or_else(|| anyhow!("truncated file: read of {len} bytes at offset {pos}"))
    }

    pub fn u16_at(&self, pos: usize) -> Result<u16> {
        let b = self.bytes_at(pos, 2)?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes([b[0], b[1]]),
            Endian::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    pub fn u32_at(&self, pos: usize) -> Result<u32> {
        let b = self.bytes_at(pos, 4)?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Endian::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    pub fn u64_at(&self, pos: usize) -> Result<u64> {
        let b = self.bytes_at(pos, 8)?;
        let arr = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(arr),
            Endian::Big => u64::from_be_bytes(arr),
        })
    }

    /// Read an integer of the file's word size (4 bytes on 32-bit files,
    /// 8 bytes on 64-bit files).
    pub fn uint_at(&self, pos: usize, len: usize) -> Result<u64> {
        match len {
            2 => Ok(u64::from(self.u16_at(pos)?)),
            4 => Ok(u64::from(self.u32_at(pos)?)),
            8 => self.u64_at(pos),
            _ => bail!("unsupported integer width {len}"),
        }
    }
}
