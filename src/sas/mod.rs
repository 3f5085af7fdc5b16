//! Reader for the SAS7BDAT statistical dataset format.
//!
//! The upstream immigration extracts ship as SAS7BDAT, so the format is
//! decoded here directly into Arrow record batches: file header, metadata
//! subheaders (row size, column size, column text/name/attributes), then
//! row data from mix and data pages. Uncompressed and SASYZCRL (RLE)
//! compressed rows are supported; SASYZCR2 (RDC) files are rejected.
//!
//! SAS numerics are 3-8 byte truncated IEEE754 doubles widened to f64
//! (NaN means missing); character columns are fixed-width, space padded.

mod buf;
mod header;
mod page;
mod reader;
mod rle;
#[cfg(test)]
pub(crate) mod testutil;

pub use reader::SasReader;
