use anyhow::{bail, Result};

use super::buf::{Endian, RawBuf};

/// Magic number at the start of every SAS7BDAT file.
pub const MAGIC: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc2, 0xea, 0x81,
    0x60, 0xb3, 0x14, 0x11, 0xcf, 0xbd, 0x92, 0x08, 0x00, 0x09, 0xc7, 0x31, 0x8c, 0x18, 0x1f,
    0x10, 0x11,
];

const ALIGN_CHECK: u8 = 0x33;
const MIN_HEADER: usize = 288;

/// Fixed facts decoded from the file header: word size, byte order, and
/// the page geometry everything else is addressed by.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub endian: Endian,
    pub u64_format: bool,
    /// 4 on 32-bit files, 8 on 64-bit files.
    pub int_len: usize,
    /// Offset within a page where the page header fields start.
    pub page_bit_offset: usize,
    /// Encoded size of one subheader pointer.
    pub subheader_ptr_len: usize,
    pub header_length: usize,
    pub page_length: usize,
    pub page_count: usize,
}

impl FileHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_HEADER {
            bail!(
                "file too short for a SAS7BDAT header ({} bytes, need {MIN_HEADER})",
                data.len()
            );
        }
        if data[..32] != MAGIC {
            bail!("not a SAS7BDAT file (bad magic number)");
        }

        // Offset 32 selects the 64-bit layout, offset 35 adds extra header
        // alignment; both use the same checker byte.
        let u64_format = data[32] == ALIGN_CHECK;
        let align1 = if data[35] == ALIGN_CHECK { 4 } else { 0 };
        let endian = match data[37] {
            0x01 => Endian::Little,
            0x00 => Endian::Big,
            b => bail!("unknown endianness marker {b:#04x} at offset 37"),
        };

        let (int_len, page_bit_offset, subheader_ptr_len) =
            if u64_format { (8, 32, 24) } else { (4, 16, 12) };

        let buf = RawBuf::new(data, endian);
        let header_length = buf.u32_at(196 + align1)? as usize;
        let page_length = buf.u32_at(200 + align1)? as usize;
        let page_count = buf.uint_at(204 + align1, int_len)? as usize;

        if header_length < MIN_HEADER || page_length == 0 {
            bail!("implausible geometry: header {header_length} bytes, pages {page_length} bytes");
        }

        Ok(Self {
            endian,
            u64_format,
            int_len,
            page_bit_offset,
            subheader_ptr_len,
            header_length,
            page_length,
            page_count,
        })
    }

    /// Byte offset of a page within the file.
    pub fn page_start(&self, index: usize) -> usize {
        self.header_length + index * self.page_length
    }
}
