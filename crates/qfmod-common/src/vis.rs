// vis.rs — run-length coding of per-leaf / per-cluster visibility rows
//
// Nonzero bytes are stored literally. A zero byte is followed by a count
// (1..=255) of consecutive zero bytes.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VisError {
    #[error("visibility data ends after {produced} of {row} bytes")]
    Truncated { produced: usize, row: usize },
    #[error("visibility run overruns row of {row} bytes at byte {at}")]
    Overrun { at: usize, row: usize },
    #[error("visibility buffer of {len} bytes is shorter than row of {row} bytes")]
    ShortBuffer { len: usize, row: usize },
}

/// Bytes needed to hold `numbits` bits.
#[inline]
pub const fn vis_row(numbits: usize) -> usize {
    (numbits + 7) >> 3
}

/// Compress `bits` onto the end of `out`. Returns the number of bytes written.
pub fn compress_vis(bits: &[u8], out: &mut Vec<u8>) -> usize {
    let start = out.len();
    let mut i = 0;
    while i < bits.len() {
        let b = bits[i];
        out.push(b);
        i += 1;
        if b != 0 {
            continue;
        }
        let mut rep: u8 = 1;
        while i < bits.len() && bits[i] == 0 && rep < 255 {
            rep += 1;
            i += 1;
        }
        out.push(rep);
    }
    out.len() - start
}

/// Decode one row, overwriting `out[..row]`.
///
/// `input` of `None` means no visibility was recorded; the row is filled with
/// `defvis`.
pub fn decompress_vis_set(
    input: Option<&[u8]>,
    row: usize,
    defvis: u8,
    out: &mut [u8],
) -> Result<(), VisError> {
    if out.len() < row {
        return Err(VisError::ShortBuffer { len: out.len(), row });
    }
    let Some(input) = input else {
        out[..row].fill(defvis);
        return Ok(());
    };

    let mut inp = 0;
    let mut outp = 0;
    while outp < row {
        let b = *input
            .get(inp)
            .ok_or(VisError::Truncated { produced: outp, row })?;
        if b != 0 {
            out[outp] = b;
            outp += 1;
            inp += 1;
            continue;
        }
        let c = *input
            .get(inp + 1)
            .ok_or(VisError::Truncated { produced: outp, row })? as usize;
        inp += 2;
        if outp + c > row {
            return Err(VisError::Overrun { at: outp, row });
        }
        out[outp..outp + c].fill(0);
        outp += c;
    }
    Ok(())
}

/// Decode one row, OR-ing it into `out[..row]`. Zero runs leave the
/// destination untouched.
pub fn decompress_vis_mix(
    input: Option<&[u8]>,
    row: usize,
    defvis: u8,
    out: &mut [u8],
) -> Result<(), VisError> {
    if out.len() < row {
        return Err(VisError::ShortBuffer { len: out.len(), row });
    }
    let Some(input) = input else {
        for b in &mut out[..row] {
            *b |= defvis;
        }
        return Ok(());
    };

    let mut inp = 0;
    let mut outp = 0;
    while outp < row {
        let b = *input
            .get(inp)
            .ok_or(VisError::Truncated { produced: outp, row })?;
        if b != 0 {
            out[outp] |= b;
            outp += 1;
            inp += 1;
            continue;
        }
        let c = *input
            .get(inp + 1)
            .ok_or(VisError::Truncated { produced: outp, row })? as usize;
        inp += 2;
        if outp + c > row {
            return Err(VisError::Overrun { at: outp, row });
        }
        outp += c;
    }
    Ok(())
}
