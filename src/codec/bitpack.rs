//! Fixed-width bit packing for blocks of small integers

use std::io;

/// Pack `values` using the minimum width that fits the largest one.
/// The width is written as a leading byte.
pub fn bitpack_encode(values: &[u32], output: &mut Vec<u8>) {
    let max_val = values.iter().copied().max().unwrap_or(0);
    if values.is_empty() {
        output.push(0);
        return;
    }
    let bits_needed = (32 - max_val.leading_zeros()).max(1) as u8;
    output.push(bits_needed);

    let mut current: u64 = 0;
    let mut bits_in_current = 0u32;

    for &value in values {
        current |= (value as u64) << bits_in_current;
        bits_in_current += bits_needed as u32;

        while bits_in_current >= 8 {
            output.push(current as u8);
            current >>= 8;
            bits_in_current -= 8;
        }
    }

    if bits_in_current > 0 {
        output.push(current as u8);
    }
}

/// Unpack `count` integers written by [`bitpack_encode`]
pub fn bitpack_decode(input: &[u8], pos: &mut usize, count: usize) -> io::Result<Vec<u32>> {
    let Some(&width) = input.get(*pos) else {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Unexpected end of bitpack",
        ));
    };
    *pos += 1;
    let bits_needed = width as u32;

    if bits_needed == 0 {
        return Ok(vec![0; count]);
    }
    if bits_needed > 32 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bit width above 32"));
    }

    let total_bits = count as u64 * bits_needed as u64;
    let bytes_needed = total_bits.div_ceil(8) as usize;
    if *pos + bytes_needed > input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough bytes for bitpack",
        ));
    }

    let mut values = Vec::with_capacity(count);
    let mut current: u64 = 0;
    let mut bits_available = 0u32;
    let mask = (1u64 << bits_needed) - 1;

    for _ in 0..count {
        while bits_available < bits_needed {
            current |= (input[*pos] as u64) << bits_available;
            *pos += 1;
            bits_available += 8;
        }
        values.push((current & mask) as u32);
        current >>= bits_needed;
        bits_available -= bits_needed;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitpack_roundtrip() {
        let values = vec![0u32, 5, 3, 7, 1, 6];
        let mut buf = Vec::new();
        bitpack_encode(&values, &mut buf);
        assert_eq!(buf[0], 3);
        let mut pos = 0;
        assert_eq!(bitpack_decode(&buf, &mut pos, values.len()).unwrap(), values);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_bitpack_wide_values() {
        let values = vec![u32::MAX, 0, 123_456_789];
        let mut buf = Vec::new();
        bitpack_encode(&values, &mut buf);
        let mut pos = 0;
        assert_eq!(bitpack_decode(&buf, &mut pos, 3).unwrap(), values);
    }

    #[test]
    fn test_bitpack_truncated() {
        let mut buf = Vec::new();
        bitpack_encode(&[1000, 2000], &mut buf);
        buf.pop();
        let mut pos = 0;
        assert!(bitpack_decode(&buf, &mut pos, 2).is_err());
    }
}
