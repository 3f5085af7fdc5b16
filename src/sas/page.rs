use anyhow::Result;

use super::buf::{Endian, RawBuf};
use super::header::FileHeader;

// Page types. Data rows live on DATA and MIX pages; metadata subheaders
// live on META and MIX pages (the high bits carry flags on some writers,
// hence the mask).
const PAGE_TYPE_MASK: u16 = 0x0F00;
const PAGE_META: u16 = 0x0000;
const PAGE_DATA: u16 = 0x0100;
const PAGE_MIX: u16 = 0x0200;

/// Subheader pointer `compression` flag values.
pub const COMPRESSION_TRUNCATED: u8 = 1;
pub const COMPRESSION_RLE: u8 = 4;
/// Subheader pointer `type` value marking a row-data subheader.
pub const SUBHEADER_TYPE_DATA: u8 = 1;

#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_type: u16,
    pub block_count: usize,
    pub subheader_count: usize,
}

impl PageHeader {
    pub fn parse(buf: &RawBuf<'_>, page_start: usize, header: &FileHeader) -> Result<Self> {
        let base = page_start + header.page_bit_offset;
        Ok(Self {
            page_type: buf.u16_at(base)?,
            block_count: usize::from(buf.u16_at(base + 2)?),
            subheader_count: usize::from(buf.u16_at(base + 4)?),
        })
    }

    pub fn is_meta(&self) -> bool {
        self.page_type & PAGE_TYPE_MASK == PAGE_META
    }

    pub fn is_data(&self) -> bool {
        self.page_type & PAGE_TYPE_MASK == PAGE_DATA
    }

    pub fn is_mix(&self) -> bool {
        self.page_type & PAGE_TYPE_MASK == PAGE_MIX
    }

    /// Pages whose subheader pointer table should be walked.
    pub fn has_subheaders(&self) -> bool {
        self.is_meta() || self.is_mix()
    }
}

/// One entry of a page's subheader pointer table. Offsets are relative to
/// the start of the page.
#[derive(Debug, Clone, Copy)]
pub struct SubheaderPointer {
    pub offset: usize,
    pub length: usize,
    pub compression: u8,
    pub ptype: u8,
}

/// Read the pointer table that follows the page header.
pub fn subheader_pointers(
    buf: &RawBuf<'_>,
    page_start: usize,
    header: &FileHeader,
    count: usize,
) -> Result<Vec<SubheaderPointer>> {
    let table = page_start + header.page_bit_offset + 8;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let p = table + i * header.subheader_ptr_len;
        out.push(SubheaderPointer {
            offset: buf.uint_at(p, header.int_len)? as usize,
            length: buf.uint_at(p + header.int_len, header.int_len)? as usize,
            compression: buf.bytes_at(p + 2 * header.int_len, 1)?[0],
            ptype: buf.bytes_at(p + 2 * header.int_len + 1, 1)?[0],
        });
    }
    Ok(out)
}

// Subheader signatures, as the 32-bit value embedded in the (possibly
// sign-extended) signature word.
const SIG_ROW_SIZE: u32 = 0xF7F7_F7F7;
const SIG_COLUMN_SIZE: u32 = 0xF6F6_F6F6;
const SIG_SUBHEADER_COUNTS: u32 = 0xFFFF_FC00;
const SIG_COLUMN_TEXT: u32 = 0xFFFF_FFFD;
const SIG_COLUMN_NAME: u32 = 0xFFFF_FFFF;
const SIG_COLUMN_ATTRS: u32 = 0xFFFF_FFFC;
const SIG_COLUMN_FORMAT: u32 = 0xFFFF_FBFE;
const SIG_COLUMN_LIST: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    RowSize,
    ColumnSize,
    SubheaderCounts,
    ColumnText,
    ColumnName,
    ColumnAttributes,
    ColumnFormat,
    ColumnList,
    Unknown,
}

/// Identify a subheader by the signature word at its start. On 64-bit
/// files the 32-bit signature is sign-extended to 8 bytes; the meaningful
/// half sits first on little-endian files and last on big-endian ones.
pub fn identify(buf: &RawBuf<'_>, offset: usize, header: &FileHeader) -> Result<Signature> {
    let pos = if header.u64_format && header.endian == Endian::Big {
        offset + 4
    } else {
        offset
    };
    let sig = buf.u32_at(pos)?;
    Ok(match sig {
        SIG_ROW_SIZE => Signature::RowSize,
        SIG_COLUMN_SIZE => Signature::ColumnSize,
        SIG_SUBHEADER_COUNTS => Signature::SubheaderCounts,
        SIG_COLUMN_TEXT => Signature::ColumnText,
        SIG_COLUMN_NAME => Signature::ColumnName,
        SIG_COLUMN_ATTRS => Signature::ColumnAttributes,
        SIG_COLUMN_FORMAT => Signature::ColumnFormat,
        SIG_COLUMN_LIST => Signature::ColumnList,
        _ => Signature::Unknown,
    })
}
