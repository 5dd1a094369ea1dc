//! Byte-level helpers shared by the container parsers and decoders.

use std::io::{self, ErrorKind, Read};

/// Boxed input every decoder owns.
pub type SourceReader = Box<dyn Read + Send>;

/// Read until `buf` is full or the reader is exhausted.
///
/// Returns the number of bytes read; a short count means end of input.
pub fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Discard exactly `count` bytes.
pub fn skip<R: Read + ?Sized>(reader: &mut R, count: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.take(count), &mut io::sink())?;
    if skipped < count {
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("expected to skip {} bytes, input ended after {}", count, skipped),
        ));
    }
    Ok(())
}

fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Read a four character chunk or magic identifier.
pub fn read_tag<R: Read + ?Sized>(reader: &mut R) -> io::Result<[u8; 4]> {
    read_array::<4, R>(reader)
}

pub fn read_u8<R: Read + ?Sized>(reader: &mut R) -> io::Result<u8> {
    Ok(read_array::<1, R>(reader)?[0])
}

pub fn read_u16_le<R: Read + ?Sized>(reader: &mut R) -> io::Result<u16> {
    Ok(u16::from_le_bytes(read_array(reader)?))
}

pub fn read_u32_le<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

pub fn read_u16_be<R: Read + ?Sized>(reader: &mut R) -> io::Result<u16> {
    Ok(u16::from_be_bytes(read_array(reader)?))
}

pub fn read_i16_be<R: Read + ?Sized>(reader: &mut R) -> io::Result<i16> {
    Ok(i16::from_be_bytes(read_array(reader)?))
}

pub fn read_u24_be<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let [a, b, c] = read_array::<3, R>(reader)?;
    Ok(u32::from_be_bytes([0, a, b, c]))
}

pub fn read_u32_be<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    Ok(u32::from_be_bytes(read_array(reader)?))
}

pub fn read_u64_be<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    Ok(u64::from_be_bytes(read_array(reader)?))
}

/// Convert an IEEE 754 80-bit extended precision big-endian value to `f64`.
///
/// Layout: sign bit, 15-bit exponent biased by 16383, 64-bit mantissa with an
/// explicit integer bit.
pub fn extended_to_f64(bytes: [u8; 10]) -> f64 {
    let sign_exponent = u16::from_be_bytes([bytes[0], bytes[1]]);
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes.copy_from_slice(&bytes[2..]);
    let mantissa = u64::from_be_bytes(mantissa_bytes);

    let negative = sign_exponent & 0x8000 != 0;
    let exponent = i32::from(sign_exponent & 0x7FFF);

    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    if exponent == 0x7FFF {
        return if mantissa << 1 == 0 {
            if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        } else {
            f64::NAN
        };
    }

    let value = mantissa as f64 * 2f64.powi(exponent - 16383 - 63);
    if negative {
        -value
    } else {
        value
    }
}

/// Reader limited to a declared number of payload bytes.
///
/// Decoders use it to stop at the end of the data chunk even when the
/// container has trailing chunks.
pub struct BoundedReader {
    inner: SourceReader,
    remaining: u64,
}

impl BoundedReader {
    pub fn new(inner: SourceReader, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Unbounded variant for self-delimiting formats.
    pub fn unbounded(inner: SourceReader) -> Self {
        Self::new(inner, u64::MAX)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Run-to-completion read bounded by the remaining byte budget.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
        if limit == 0 {
            return Ok(0);
        }
        let read = read_fully(&mut self.inner, &mut buf[..limit])?;
        if read < limit {
            // input ended early, nothing more will come
            self.remaining = 0;
        } else {
            self.remaining -= read as u64;
        }
        Ok(read)
    }
}

impl std::fmt::Debug for BoundedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedReader")
            .field("remaining", &self.remaining)
            .finish()
    }
}
