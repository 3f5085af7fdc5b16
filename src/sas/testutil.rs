//! In-memory SAS7BDAT fixture builder for tests: 64-bit little-endian
//! files with 8-byte columns, assembled the same way SAS lays them out
//! (header, metadata subheaders, then rows on data, mix, or compressed
//! subheader pages).

use super::header::MAGIC;

pub(crate) const HEADER_LEN: usize = 1024;
pub(crate) const PAGE_LEN: usize = 4096;
const CELL_WIDTH: usize = 8;
const SUBHEADER_CONTENT_OFFSET: usize = 2048;

#[derive(Clone, Copy)]
pub(crate) enum Cell {
    /// `None` encodes the SAS missing value (NaN).
    Num(Option<f64>),
    /// Empty string encodes an all-blank (null) field.
    Str(&'static str),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// Metadata page followed by a plain data page.
    Data,
    /// Single mix page carrying both metadata and rows.
    Mix,
    /// SASYZCRL file: each row is an RLE-compressed subheader.
    Rle,
}

pub(crate) fn build_sas(columns: &[(&str, bool)], rows: &[Vec<Cell>], layout: Layout) -> Vec<u8> {
    let literal: Option<&[u8]> = match layout {
        Layout::Rle => Some(b"SASYZCRL"),
        _ => None,
    };
    build_inner(columns, rows, layout, literal)
}

/// File whose first text block advertises RDC compression.
pub(crate) fn build_rdc(columns: &[(&str, bool)]) -> Vec<u8> {
    build_inner(columns, &[], Layout::Data, Some(b"SASYZCR2"))
}

pub(crate) fn put_u16(d: &mut [u8], pos: usize, v: u16) {
    d[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
}
pub(crate) fn put_u32(d: &mut [u8], pos: usize, v: u32) {
    d[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}
pub(crate) fn put_u64(d: &mut [u8], pos: usize, v: u64) {
    d[pos..pos + 8].copy_from_slice(&v.to_le_bytes());
}

/// Little-endian sign-extended signature word, as 64-bit writers emit it.
fn sig8(sig: u32) -> [u8; 8] {
    let ext = if sig & 0x8000_0000 != 0 { 0xFF } else { 0x00 };
    let s = sig.to_le_bytes();
    [s[0], s[1], s[2], s[3], ext, ext, ext, ext]
}

fn file_header(page_count: u64) -> Vec<u8> {
    let mut h = vec![0u8; HEADER_LEN];
    h[..32].copy_from_slice(&MAGIC);
    h[32] = 0x33; // 64-bit layout
    h[35] = 0x33; // extra header alignment
    h[37] = 0x01; // little endian
    put_u32(&mut h, 200, HEADER_LEN as u32);
    put_u32(&mut h, 204, PAGE_LEN as u32);
    put_u64(&mut h, 208, page_count);
    h
}

fn encode_row(cells: &[Cell]) -> Vec<u8> {
    let mut row = Vec::with_capacity(cells.len() * CELL_WIDTH);
    for cell in cells {
        match cell {
            Cell::Num(v) => row.extend_from_slice(&v.unwrap_or(f64::NAN).to_le_bytes()),
            Cell::Str(s) => {
                assert!(s.len() <= CELL_WIDTH, "fixture strings are at most 8 bytes");
                let mut field = [b' '; CELL_WIDTH];
                field[..s.len()].copy_from_slice(s.as_bytes());
                row.extend_from_slice(&field);
            }
        }
    }
    row
}

/// Short-band literal copy: one control byte then the row verbatim.
fn rle_pack(row: &[u8]) -> Vec<u8> {
    assert!(!row.is_empty() && row.len() <= 64, "short literal band only");
    let n = row.len() - 1;
    let mut out = vec![0x80 | ((n as u8 >> 4) << 4) | (n as u8 & 0x0F)];
    out.extend_from_slice(row);
    out
}

fn row_size_subheader(row_len: u64, row_count: u64, mix_rows: u64, ncols: u64) -> Vec<u8> {
    let mut s = vec![0u8; 808];
    s[..8].copy_from_slice(&sig8(0xF7F7_F7F7));
    put_u64(&mut s, 40, row_len);
    put_u64(&mut s, 48, row_count);
    put_u64(&mut s, 72, ncols); // column count, part 1
    put_u64(&mut s, 120, mix_rows);
    s
}

fn col_size_subheader(ncols: u64) -> Vec<u8> {
    let mut s = vec![0u8; 16];
    s[..8].copy_from_slice(&sig8(0xF6F6_F6F6));
    put_u64(&mut s, 8, ncols);
    s
}

/// Text block: [u16 size][literal/pad to 16][column names back to back].
/// Returns the subheader plus the name references it implies.
fn col_text_subheader(
    columns: &[(&str, bool)],
    literal: Option<&[u8]>,
) -> (Vec<u8>, Vec<(u16, u16, u16)>) {
    let mut names_area = Vec::new();
    let mut refs = Vec::with_capacity(columns.len());
    for (name, _) in columns {
        refs.push((0u16, (16 + names_area.len()) as u16, name.len() as u16));
        names_area.extend_from_slice(name.as_bytes());
    }
    let block_size = 16 + names_area.len();
    let mut block = vec![0u8; block_size];
    put_u16(&mut block, 0, block_size as u16);
    if let Some(lit) = literal {
        block[2..2 + lit.len()].copy_from_slice(lit);
    }
    block[16..].copy_from_slice(&names_area);

    let mut s = vec![0u8; 8 + block.len()];
    s[..8].copy_from_slice(&sig8(0xFFFF_FFFD));
    s[8..].copy_from_slice(&block);
    (s, refs)
}

fn col_name_subheader(refs: &[(u16, u16, u16)]) -> Vec<u8> {
    let mut s = vec![0u8; 28 + 8 * refs.len()];
    s[..8].copy_from_slice(&sig8(0xFFFF_FFFF));
    let mut p = 16;
    for &(block, off, len) in refs {
        put_u16(&mut s, p, block);
        put_u16(&mut s, p + 2, off);
        put_u16(&mut s, p + 4, len);
        p += 8;
    }
    s
}

fn col_attr_subheader(columns: &[(&str, bool)]) -> Vec<u8> {
    let mut s = vec![0u8; 28 + 16 * columns.len()];
    s[..8].copy_from_slice(&sig8(0xFFFF_FFFC));
    let mut p = 16;
    for (i, (_, numeric)) in columns.iter().enumerate() {
        put_u64(&mut s, p, (i * CELL_WIDTH) as u64);
        put_u32(&mut s, p + 8, CELL_WIDTH as u32);
        s[p + 14] = if *numeric { 1 } else { 2 };
        p += 16;
    }
    s
}

/// Page with a subheader pointer table; content lands in the upper half
/// of the page, well past any embedded mix rows.
fn subheader_page(page_type: u16, subheaders: &[(Vec<u8>, u8, u8)]) -> Vec<u8> {
    let mut p = vec![0u8; PAGE_LEN];
    put_u16(&mut p, 32, page_type);
    put_u16(&mut p, 34, subheaders.len() as u16);
    put_u16(&mut p, 36, subheaders.len() as u16);
    let mut ptr = 40;
    let mut off = SUBHEADER_CONTENT_OFFSET;
    for (bytes, comp, ptype) in subheaders {
        assert!(off + bytes.len() <= PAGE_LEN, "fixture page overflow");
        put_u64(&mut p, ptr, off as u64);
        put_u64(&mut p, ptr + 8, bytes.len() as u64);
        p[ptr + 16] = *comp;
        p[ptr + 17] = *ptype;
        p[off..off + bytes.len()].copy_from_slice(bytes);
        off += bytes.len();
        ptr += 24;
    }
    p
}

fn data_page(rows: &[Vec<u8>]) -> Vec<u8> {
    let mut p = vec![0u8; PAGE_LEN];
    put_u16(&mut p, 32, 256);
    put_u16(&mut p, 34, rows.len() as u16);
    let mut off = 40;
    for r in rows {
        p[off..off + r.len()].copy_from_slice(r);
        off += r.len();
    }
    p
}

fn build_inner(
    columns: &[(&str, bool)],
    rows: &[Vec<Cell>],
    layout: Layout,
    literal: Option<&[u8]>,
) -> Vec<u8> {
    let ncols = columns.len();
    let row_len = ncols * CELL_WIDTH;
    let encoded: Vec<Vec<u8>> = rows.iter().map(|r| encode_row(r)).collect();
    let mix_rows = if layout == Layout::Mix { rows.len() } else { 0 };

    let (text, refs) = col_text_subheader(columns, literal);
    let mut subs: Vec<(Vec<u8>, u8, u8)> = vec![
        (
            row_size_subheader(row_len as u64, rows.len() as u64, mix_rows as u64, ncols as u64),
            0,
            0,
        ),
        (col_size_subheader(ncols as u64), 0, 0),
        (text, 0, 0),
        (col_name_subheader(&refs), 0, 0),
        (col_attr_subheader(columns), 0, 0),
    ];
    if layout == Layout::Rle {
        for row in &encoded {
            subs.push((rle_pack(row), 4, 1)); // compressed row-data subheader
        }
    }

    let meta_type = if layout == Layout::Mix { 512 } else { 0 };
    let mut first_page = subheader_page(meta_type, &subs);
    if layout == Layout::Mix {
        // Rows follow the pointer table, with the SAS alignment quirk of
        // adding the remainder mod 8.
        let table_end = 32 + 8 + subs.len() * 24;
        let mut off = table_end + table_end % 8;
        for row in &encoded {
            assert!(off + row.len() <= SUBHEADER_CONTENT_OFFSET, "mix rows overflow");
            first_page[off..off + row.len()].copy_from_slice(row);
            off += row.len();
        }
    }

    let wants_data_page = layout == Layout::Data && !encoded.is_empty();
    let mut file = file_header(if wants_data_page { 2 } else { 1 });
    file.extend(first_page);
    if wants_data_page {
        file.extend(data_page(&encoded));
    }
    file
}
