use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::buf::{Endian, RawBuf};
use super::header::FileHeader;
use super::page::{
    self, PageHeader, Signature, COMPRESSION_RLE, COMPRESSION_TRUNCATED, SUBHEADER_TYPE_DATA,
};
use super::rle;

const RLE_LITERAL: &[u8] = b"SASYZCRL";
const RDC_LITERAL: &[u8] = b"SASYZCR2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Rle,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    /// Byte offset of the value within a row.
    offset: usize,
    /// Encoded width of the value in bytes.
    len: usize,
    numeric: bool,
}

#[derive(Debug)]
struct Metadata {
    row_length: usize,
    row_count: usize,
    mix_page_row_count: usize,
    columns: Vec<Column>,
    compression: Compression,
}

/// Reads a whole SAS7BDAT file into one Arrow record batch.
///
/// Numeric columns come out as nullable `Float64` (SAS missing values are
/// NaN-encoded), character columns as nullable `Utf8` with trailing
/// padding stripped.
#[derive(Debug)]
pub struct SasReader {
    data: Vec<u8>,
    header: FileHeader,
    meta: Metadata,
}

impl SasReader {
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(&path)
            .with_context(|| format!("reading SAS file {}", path.as_ref().display()))?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = FileHeader::parse(&data)?;
        let meta = collect_metadata(&data, &header)?;
        debug!(
            rows = meta.row_count,
            columns = meta.columns.len(),
            compressed = meta.compression == Compression::Rle,
            "SAS metadata collected"
        );
        Ok(Self { data, header, meta })
    }

    pub fn schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .meta
            .columns
            .iter()
            .map(|c| {
                let dt = if c.numeric {
                    DataType::Float64
                } else {
                    DataType::Utf8
                };
                Field::new(&c.name, dt, true)
            })
            .collect();
        Arc::new(Schema::new(fields))
    }

    pub fn row_count(&self) -> usize {
        self.meta.row_count
    }

    /// Decode every row in page order into a single batch.
    pub fn read_all(&self) -> Result<RecordBatch> {
        let buf = RawBuf::new(&self.data, self.header.endian);
        let mut builders: Vec<ColumnData> = self
            .meta
            .columns
            .iter()
            .map(|c| {
                if c.numeric {
                    ColumnData::Num(Float64Builder::with_capacity(self.meta.row_count))
                } else {
                    ColumnData::Str(StringBuilder::new())
                }
            })
            .collect();

        let mut rows = 0usize;
        for page_idx in 0..self.header.page_count {
            if rows >= self.meta.row_count {
                break;
            }
            let base = self.header.page_start(page_idx);
            let ph = PageHeader::parse(&buf, base, &self.header)
                .with_context(|| format!("page {page_idx} header"))?;

            if ph.has_subheaders() {
                // Compressed files store each row as its own subheader.
                let ptrs =
                    page::subheader_pointers(&buf, base, &self.header, ph.subheader_count)?;
                for ptr in ptrs {
                    if rows >= self.meta.row_count {
                        break;
                    }
                    if ptr.length == 0 || ptr.compression == COMPRESSION_TRUNCATED {
                        continue;
                    }
                    let sig = page::identify(&buf, base + ptr.offset, &self.header)?;
                    let is_data_row = sig == Signature::Unknown
                        && self.meta.compression != Compression::None
                        && ptr.ptype == SUBHEADER_TYPE_DATA
                        && (ptr.compression == 0 || ptr.compression == COMPRESSION_RLE);
                    if !is_data_row {
                        continue;
                    }
                    let raw = buf.bytes_at(base + ptr.offset, ptr.length)?;
                    if ptr.compression == COMPRESSION_RLE && raw.len() != self.meta.row_length {
                        let row = rle::decompress(raw, self.meta.row_length)
                            .with_context(|| format!("row {rows} on page {page_idx}"))?;
                        self.append_row(&row, &mut builders)?;
                    } else {
                        self.append_row(raw, &mut builders)?;
                    }
                    rows += 1;
                }
            }

            if ph.is_mix() {
                // Plain rows follow the pointer table, aligned the way SAS
                // aligns them (add the remainder, not round up).
                let table_end =
                    self.header.page_bit_offset + 8 + ph.subheader_count * self.header.subheader_ptr_len;
                let mut off = base + table_end + table_end % 8;
                let n = self
                    .meta
                    .mix_page_row_count
                    .min(self.meta.row_count - rows);
                for _ in 0..n {
                    self.append_row(buf.bytes_at(off, self.meta.row_length)?, &mut builders)?;
                    off += self.meta.row_length;
                    rows += 1;
                }
            } else if ph.is_data() {
                let mut off = base + self.header.page_bit_offset + 8;
                let n = ph.block_count.min(self.meta.row_count - rows);
                for _ in 0..n {
                    self.append_row(buf.bytes_at(off, self.meta.row_length)?, &mut builders)?;
                    off += self.meta.row_length;
                    rows += 1;
                }
            }
        }

        if rows < self.meta.row_count {
            bail!(
                "file claims {} rows but only {rows} could be decoded",
                self.meta.row_count
            );
        }

        let arrays: Vec<ArrayRef> = builders
            .into_iter()
            .map(|b| match b {
                ColumnData::Num(mut b) => Arc::new(b.finish()) as ArrayRef,
                ColumnData::Str(mut b) => Arc::new(b.finish()) as ArrayRef,
            })
            .collect();
        RecordBatch::try_new(self.schema(), arrays).context("assembling SAS record batch")
    }

    fn append_row(&self, row: &[u8], builders: &mut [ColumnData]) -> Result<()> {
        if row.len() < self.meta.row_length {
            bail!(
                "row of {} bytes, expected {}",
                row.len(),
                self.meta.row_length
            );
        }
        for (col, builder) in self.meta.columns.iter().zip(builders.iter_mut()) {
            let bytes = &row[col.offset..col.offset + col.len];
            match builder {
                ColumnData::Num(b) => b.append_option(decode_numeric(bytes, self.header.endian)?),
                ColumnData::Str(b) => b.append_option(decode_character(bytes)),
            }
        }
        Ok(())
    }
}

enum ColumnData {
    Num(Float64Builder),
    Str(StringBuilder),
}

/// SAS stores numerics as the top `len` bytes of an 8-byte double.
fn decode_numeric(bytes: &[u8], endian: Endian) -> Result<Option<f64>> {
    if bytes.is_empty() || bytes.len() > 8 {
        bail!("numeric value of {} bytes", bytes.len());
    }
    let mut full = [0u8; 8];
    let v = match endian {
        Endian::Little => {
            full[8 - bytes.len()..].copy_from_slice(bytes);
            f64::from_le_bytes(full)
        }
        Endian::Big => {
            full[..bytes.len()].copy_from_slice(bytes);
            f64::from_be_bytes(full)
        }
    };
    // All SAS missing values (".", ".A".. ".Z", "._") decode as NaN.
    Ok(if v.is_nan() { None } else { Some(v) })
}

fn decode_character(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    if end == 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Reference into a column-text block: (block index, offset, length).
type TextRef = (usize, usize, usize);

fn collect_metadata(data: &[u8], header: &FileHeader) -> Result<Metadata> {
    let buf = RawBuf::new(data, header.endian);
    let int_len = header.int_len;

    let mut row_length = None;
    let mut row_count = None;
    let mut mix_page_row_count = 0usize;
    let mut col_count = None;
    let mut compression = Compression::None;
    let mut text_blocks: Vec<Vec<u8>> = Vec::new();
    let mut name_refs: Vec<TextRef> = Vec::new();
    // (row offset, width, type byte) per column, in declaration order.
    let mut attrs: Vec<(usize, usize, u8)> = Vec::new();

    'pages: for page_idx in 0..header.page_count {
        let base = header.page_start(page_idx);
        let ph = PageHeader::parse(&buf, base, header)
            .with_context(|| format!("page {page_idx} header"))?;
        if !ph.has_subheaders() {
            continue;
        }

        for ptr in page::subheader_pointers(&buf, base, header, ph.subheader_count)? {
            if ptr.length == 0 || ptr.compression == COMPRESSION_TRUNCATED {
                continue;
            }
            let off = base + ptr.offset;
            match page::identify(&buf, off, header)? {
                Signature::RowSize => {
                    row_length = Some(buf.uint_at(off + 5 * int_len, int_len)? as usize);
                    row_count = Some(buf.uint_at(off + 6 * int_len, int_len)? as usize);
                    let p1 = buf.uint_at(off + 9 * int_len, int_len)? as usize;
                    let p2 = buf.uint_at(off + 10 * int_len, int_len)? as usize;
                    col_count.get_or_insert(p1 + p2);
                    mix_page_row_count = buf.uint_at(off + 15 * int_len, int_len)? as usize;
                }
                Signature::ColumnSize => {
                    col_count = Some(buf.uint_at(off + int_len, int_len)? as usize);
                }
                Signature::ColumnText => {
                    let block_size = usize::from(buf.u16_at(off + int_len)?);
                    let block = buf.bytes_at(off + int_len, block_size)?.to_vec();
                    if text_blocks.is_empty() {
                        if contains(&block, RDC_LITERAL) {
                            bail!("SASYZCR2 (RDC) compressed SAS files are not supported");
                        }
                        if contains(&block, RLE_LITERAL) {
                            compression = Compression::Rle;
                        }
                    }
                    text_blocks.push(block);
                }
                Signature::ColumnName => {
                    let n = (ptr.length.saturating_sub(2 * int_len + 12)) / 8;
                    for i in 0..n {
                        let p = off + int_len + 8 * (i + 1);
                        name_refs.push((
                            usize::from(buf.u16_at(p)?),
                            usize::from(buf.u16_at(p + 2)?),
                            usize::from(buf.u16_at(p + 4)?),
                        ));
                    }
                }
                Signature::ColumnAttributes => {
                    let stride = int_len + 8;
                    let n = (ptr.length.saturating_sub(2 * int_len + 12)) / stride;
                    for i in 0..n {
                        let p = off + int_len + 8 + i * stride;
                        attrs.push((
                            buf.uint_at(p, int_len)? as usize,
                            buf.u32_at(p + int_len)? as usize,
                            buf.bytes_at(p + int_len + 6, 1)?[0],
                        ));
                    }
                }
                // Counts, formats, and the column list carry nothing we need.
                _ => {}
            }
        }

        if let (Some(_), Some(_), Some(n)) = (row_length, row_count, col_count) {
            if name_refs.len() >= n && attrs.len() >= n {
                break 'pages;
            }
        }
    }

    let row_length = row_length.ok_or_else(|| anyhow!("no row-size subheader found"))?;
    let row_count = row_count.ok_or_else(|| anyhow!("no row-size subheader found"))?;
    let col_count = col_count.ok_or_else(|| anyhow!("no column-size subheader found"))?;
    if col_count == 0 {
        bail!("SAS file declares zero columns");
    }
    if name_refs.len() < col_count || attrs.len() < col_count {
        bail!(
            "incomplete column metadata: {} names and {} attributes for {col_count} columns",
            name_refs.len(),
            attrs.len()
        );
    }

    let mut columns = Vec::with_capacity(col_count);
    for (i, (&(block, noff, nlen), &(offset, len, type_byte))) in
        name_refs.iter().zip(attrs.iter()).enumerate().take(col_count)
    {
        let text = text_blocks
            .get(block)
            .ok_or_else(|| anyhow!("column {i} references missing text block {block}"))?;
        let raw = text
            .get(noff..noff + nlen)
            .ok_or_else(|| anyhow!("column {i} name reference out of range"))?;
        let name = decode_character(raw).unwrap_or_else(|| format!("column_{i}"));
        if offset + len > row_length {
            bail!("column {name:?} extends past the row ({offset}+{len} > {row_length})");
        }
        columns.push(Column {
            name,
            offset,
            len,
            // Type byte: 1 = numeric, 2 = character.
            numeric: type_byte == 1,
        });
    }

    Ok(Metadata {
        row_length,
        row_count,
        mix_page_row_count,
        columns,
        compression,
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
