use anyhow::{bail, Result};

/// Decompress one SASYZCRL (run-length encoded) row.
///
/// Each control byte carries a command in the high nibble and a length
/// seed in the low nibble; commands either copy literal input bytes,
/// repeat a single byte, or fill with a fixed byte (space, `@`, or NUL).
pub fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0;

    while pos < input.len() && out.len() < expected_len {
        let control = input[pos] & 0xF0;
        let low = usize::from(input[pos] & 0x0F);
        pos += 1;

        match control {
            // Long literal copy: 12-bit length + 64.
            0x00 => {
                let n = low * 256 + usize::from(take(input, &mut pos)?) + 64;
                copy_literal(input, &mut pos, &mut out, n)?;
            }
            // Long single-byte run: length from two nibble-packed bytes + 18.
            0x40 => {
                let n = low * 16 + usize::from(take(input, &mut pos)?) + 18;
                let b = take(input, &mut pos)?;
                out.extend(std::iter::repeat_n(b, n));
            }
            // Long space fill.
            0x60 => {
                let n = low * 256 + usize::from(take(input, &mut pos)?) + 17;
                out.extend(std::iter::repeat_n(b' ', n));
            }
            // Long zero fill.
            0x70 => {
                let n = low * 256 + usize::from(take(input, &mut pos)?) + 17;
                out.extend(std::iter::repeat_n(0u8, n));
            }
            // Short literal copies, lengths 1..=64 in four bands.
            0x80 | 0x90 | 0xA0 | 0xB0 => {
                let n = low + 1 + 16 * usize::from((control - 0x80) >> 4);
                copy_literal(input, &mut pos, &mut out, n)?;
            }
            // Short single-byte run, length 3..=18.
            0xC0 => {
                let n = low + 3;
                let b = take(input, &mut pos)?;
                out.extend(std::iter::repeat_n(b, n));
            }
            // Short `@` fill.
            0xD0 => out.extend(std::iter::repeat_n(b'@', low + 2)),
            // Short space fill.
            0xE0 => out.extend(std::iter::repeat_n(b' ', low + 2)),
            // Short zero fill.
            0xF0 => out.extend(std::iter::repeat_n(0u8, low + 2)),
            other => bail!("unknown RLE control byte {other:#04x} at offset {}", pos - 1),
        }
    }

    if out.len() != expected_len {
        bail!(
            "RLE row decompressed to {} bytes, expected {expected_len}",
            out.len()
        );
    }
    Ok(out)
}

fn take(input: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *input
        .get(*pos)
        .ok_or_else(|| anyhow::anyhow!("RLE input truncated at offset {pos}"))?;
    *pos += 1;
    Ok(b)
}

fn copy_literal(input: &[u8], pos: &mut usize, out: &mut Vec<u8>, n: usize) -> Result<()> {
    let end = pos.saturating_add(n);
    if end > input.len() {
        bail!("RLE literal run of {n} bytes overruns input at offset {pos}");
    }
    out.extend_from_slice(&input[*pos..end]);
    *pos = end;
    Ok(())
}
