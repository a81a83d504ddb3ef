/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

// Endian-aware, seekable random read/write primitives over a file, plus a
// detached, decompressed view of a byte range (a "scoped" sub-cursor). The
// byte order of a container is not known until its magic word is read, so
// (unlike the rest of this crate, which threads byteorder::ByteOrder as a
// compile-time type parameter the way the original code does) this module
// keeps the order as runtime state and dispatches on it.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{BbiError, Result};
use crate::utility_io::read_until_null;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Big,
    Little,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
    Snappy,
}

/* -------------------------------------------------------------------------- */

/// A seekable reader/writer with an explicit, possibly runtime-detected
/// byte order.
#[derive(Debug)]
pub struct Cursor<T> {
    inner: T,
    order: Order,
}

/* -------------------------------------------------------------------------- */

impl<T> Cursor<T> {
    pub fn new(inner: T, order: Order) -> Self {
        Cursor { inner, order }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn set_order(&mut self, order: Order) {
        self.order = order;
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/* -------------------------------------------------------------------------- */

impl<T: Seek> Cursor<T> {
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Start(pos))?)
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Current(0))?)
    }
}

/* -------------------------------------------------------------------------- */

impl<T: Read + Seek> Cursor<T> {

    /// Reads 4 bytes as big-endian and compares to `expected`. If they
    /// don't match, byte-reverses the word and compares again, adopting
    /// little-endian order on success. Leaves the cursor's order set to
    /// whichever matched; returns `BadMagic` if neither did.
    pub fn peek_magic(&mut self, expected: u32) -> Result<Order> {
        let raw = self.inner.read_u32::<BigEndian>()?;
        if raw == expected {
            self.order = Order::Big;
            return Ok(Order::Big);
        }
        if raw.swap_bytes() == expected {
            self.order = Order::Little;
            return Ok(Order::Little);
        }
        Err(BbiError::BadMagic)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(match self.order {
            Order::Big    => self.inner.read_u16::<BigEndian>()?,
            Order::Little => self.inner.read_u16::<LittleEndian>()?,
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(match self.order {
            Order::Big    => self.inner.read_u32::<BigEndian>()?,
            Order::Little => self.inner.read_u32::<LittleEndian>()?,
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(match self.order {
            Order::Big    => self.inner.read_u64::<BigEndian>()?,
            Order::Little => self.inner.read_u64::<LittleEndian>()?,
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(match self.order {
            Order::Big    => self.inner.read_f32::<BigEndian>()?,
            Order::Little => self.inner.read_f32::<LittleEndian>()?,
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(match self.order {
            Order::Big    => self.inner.read_f64::<BigEndian>()?,
            Order::Little => self.inner.read_f64::<LittleEndian>()?,
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `n` bytes and trims everything from the first NUL byte
    /// onward, matching the null-padded fixed-width keys used by the B+
    /// tree.
    pub fn read_fixed_ascii(&mut self, n: usize) -> Result<String> {
        let buf = self.read_bytes(n)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    /// Reads a NUL-terminated ASCII string of unknown length.
    pub fn read_ascii_z(&mut self) -> Result<String> {
        let buf = read_until_null(&mut self.inner)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Returns a detached sub-cursor over the decompressed contents of
    /// `[offset, offset+size)`. The compressed bytes are copied out and
    /// decompressed eagerly; the returned cursor owns an in-memory buffer
    /// and inherits this cursor's byte order.
    pub fn with_scoped(&mut self, offset: u64, size: u64, compression: Compression) -> Result<Cursor<io::Cursor<Vec<u8>>>> {
        self.seek(offset)?;
        let raw = self.read_bytes(size as usize)?;
        let data = match compression {
            Compression::None    => raw,
            Compression::Deflate => inflate_concatenated(&raw)?,
            Compression::Snappy  => inflate_snappy(&raw)?,
        };
        Ok(Cursor::new(io::Cursor::new(data), self.order))
    }
}

/* -------------------------------------------------------------------------- */

impl<T: Write + Seek> Cursor<T> {
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.inner.write_u8(v)?)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        match self.order {
            Order::Big    => self.inner.write_u16::<BigEndian>(v)?,
            Order::Little => self.inner.write_u16::<LittleEndian>(v)?,
        }
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        match self.order {
            Order::Big    => self.inner.write_u32::<BigEndian>(v)?,
            Order::Little => self.inner.write_u32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        match self.order {
            Order::Big    => self.inner.write_u64::<BigEndian>(v)?,
            Order::Little => self.inner.write_u64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        match self.order {
            Order::Big    => self.inner.write_f32::<BigEndian>(v)?,
            Order::Little => self.inner.write_f32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        match self.order {
            Order::Big    => self.inner.write_f64::<BigEndian>(v)?,
            Order::Little => self.inner.write_f64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(data)?)
    }

    pub fn write_zeroes(&mut self, n: usize) -> Result<()> {
        const CHUNK: usize = 4096;
        let zeroes = [0u8; CHUNK];
        let mut remaining = n;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            self.inner.write_all(&zeroes[..take])?;
            remaining -= take;
        }
        Ok(())
    }

    /// Writes `block` at the current position, optionally DEFLATE
    /// compressing it first, and returns the number of uncompressed bytes
    /// that were fed to the compressor (0 when `compress` is false).
    pub fn scoped_compressed(&mut self, block: &[u8], compress: bool) -> Result<(u64, usize)> {
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(block)?;
            let compressed = encoder.finish()?;
            self.write_bytes(&compressed)?;
            Ok((compressed.len() as u64, block.len()))
        } else {
            self.write_bytes(block)?;
            Ok((block.len() as u64, 0))
        }
    }
}

/* -------------------------------------------------------------------------- */

/// Inflates `data` as a sequence of zero or more concatenated ZLIB streams,
/// restarting the inflater whenever one stream ends and bytes remain.
fn inflate_concatenated(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let mut decompress = Decompress::new(true);
        let mut buf = vec![0u8; 64 * 1024];
        let mut stream_done = false;

        while !stream_done {
            let before_in  = decompress.total_in();
            let before_out = decompress.total_out();

            let status = decompress
                .decompress(&data[offset..], &mut buf, FlushDecompress::None)
                .map_err(|e| BbiError::inconsistent(format!("zlib error: {}", e)))?;

            let consumed = (decompress.total_in()  - before_in)  as usize;
            let produced = (decompress.total_out() - before_out) as usize;

            out.extend_from_slice(&buf[..produced]);
            offset += consumed;

            match status {
                Status::StreamEnd => stream_done = true,
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err(BbiError::inconsistent("zlib stream made no progress"));
                    }
                }
            }
        }
    }

    Ok(out)
}

/* -------------------------------------------------------------------------- */

fn inflate_snappy(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = snap::read::FrameDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_magic_little_endian() {
        let magic: u32 = 0x8789F2EB;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic.to_le_bytes());

        let mut cursor = Cursor::new(io::Cursor::new(bytes), Order::Big);
        let order = cursor.peek_magic(magic).unwrap();

        assert_eq!(order, Order::Little);
        assert_eq!(cursor.order(), Order::Little);
    }

    #[test]
    fn peek_magic_big_endian() {
        let magic: u32 = 0x8789F2EB;
        let bytes = magic.to_be_bytes().to_vec();

        let mut cursor = Cursor::new(io::Cursor::new(bytes), Order::Little);
        let order = cursor.peek_magic(magic).unwrap();

        assert_eq!(order, Order::Big);
    }

    #[test]
    fn peek_magic_mismatch() {
        let bytes = vec![1, 2, 3, 4];
        let mut cursor = Cursor::new(io::Cursor::new(bytes), Order::Big);

        assert!(matches!(cursor.peek_magic(0x8789F2EB), Err(BbiError::BadMagic)));
    }

    #[test]
    fn read_fixed_ascii_trims_nul_padding() {
        let bytes = b"chr1\0".to_vec();
        let mut cursor = Cursor::new(io::Cursor::new(bytes), Order::Little);

        assert_eq!(cursor.read_fixed_ascii(5).unwrap(), "chr1");
    }

    #[test]
    fn deflate_round_trip_single_stream() {
        let payload = b"the quick brown fox jumps over the lazy dog".to_vec();

        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = inflate_concatenated(&compressed).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn deflate_round_trip_concatenated_streams() {
        let a = b"first section".to_vec();
        let b = b"second section".to_vec();

        let mut bytes = Vec::new();
        for part in [&a, &b] {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(part).unwrap();
            bytes.extend_from_slice(&encoder.finish().unwrap());
        }

        let decoded = inflate_concatenated(&bytes).unwrap();
        let mut expected = a;
        expected.extend_from_slice(&b);

        assert_eq!(decoded, expected);
    }

    #[test]
    fn write_and_read_scoped_round_trip() {
        let mut backing = io::Cursor::new(Vec::new());
        {
            let mut cursor = Cursor::new(&mut backing, Order::Little);
            cursor.write_u32(42).unwrap();
            cursor.write_u32(7).unwrap();
        }

        let mut cursor = Cursor::new(backing, Order::Little);
        let mut scoped = cursor.with_scoped(0, 8, Compression::None).unwrap();

        assert_eq!(scoped.read_u32().unwrap(), 42);
        assert_eq!(scoped.read_u32().unwrap(), 7);
    }
}
