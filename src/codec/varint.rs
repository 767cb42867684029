//! Variable-byte integers
//!
//! Seven payload bits per byte; the high bit marks the final byte.

use std::io;

pub fn encode_vbyte(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> io::Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = input.get(*pos) else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected end of vbyte",
            ));
        };
        *pos += 1;

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 63 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "VByte value too large",
            ));
        }
    }
}

pub fn decode_len(input: &[u8], pos: &mut usize) -> io::Result<usize> {
    let len = decode_vbyte(input, pos)?;
    usize::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "length overflow"))
}

/// Read `len` raw bytes
pub fn read_bytes<'a>(input: &'a [u8], pos: &mut usize, len: usize) -> io::Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= input.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated buffer"))?;
    let bytes = &input[*pos..end];
    *pos = end;
    Ok(bytes)
}

pub fn read_u8(input: &[u8], pos: &mut usize) -> io::Result<u8> {
    Ok(read_bytes(input, pos, 1)?[0])
}

pub fn read_u64_le(input: &[u8], pos: &mut usize) -> io::Result<u64> {
    let bytes = read_bytes(input, pos, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Length-prefixed byte string
pub fn write_prefixed(bytes: &[u8], output: &mut Vec<u8>) {
    encode_vbyte(bytes.len() as u64, output);
    output.extend_from_slice(bytes);
}

pub fn read_prefixed<'a>(input: &'a [u8], pos: &mut usize) -> io::Result<&'a [u8]> {
    let len = decode_len(input, pos)?;
    read_bytes(input, pos, len)
}

pub fn read_string(input: &[u8], pos: &mut usize) -> io::Result<String> {
    let bytes = read_prefixed(input, pos)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
