//! Little-endian byte/field-element conversions and the textual chunk
//! format used as the Poseidon hash preimage.
//!
//! The chunk format is byte-for-byte fixed: the digest embedded in the TEE
//! quote is computed over the exact text produced here, so any whitespace
//! change breaks verification on-chain.

use crate::error::EncodingError;

/// Size of one Aleo field element carrier, in bytes.
pub const FIELD_ELEMENT_SIZE: usize = 16;
/// Field elements per formatting chunk. Matches the member limit of an Aleo
/// struct, which is why a message cannot span more than 32 chunks either.
pub const FIELDS_PER_CHUNK: usize = 32;
/// Bytes carried by one formatting chunk.
pub const FORMAT_CHUNK_SIZE: usize = FIELD_ELEMENT_SIZE * FIELDS_PER_CHUNK;
/// Upper bound on `target_chunks`.
pub const MAX_TARGET_CHUNKS: usize = 32;

/// Interpret up to 16 bytes as a little-endian u128, zero-padding the high
/// side.
pub fn to_u128_le(bytes: &[u8]) -> Result<u128, EncodingError> {
    if bytes.len() > FIELD_ELEMENT_SIZE {
        return Err(EncodingError::ValueTooLarge(bytes.len()));
    }
    let mut buf = [0u8; FIELD_ELEMENT_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(u128::from_le_bytes(buf))
}

/// Zero-pad `bytes` on the right to exactly `len` bytes. Longer inputs are
/// returned unchanged.
pub fn pad_right(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    if out.len() < len {
        out.resize(len, 0);
    }
    out
}

/// Zero-pad `bytes` on the left to exactly `len` bytes. Longer inputs are
/// returned unchanged.
pub fn pad_left(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

/// Reverse the byte order of a slice.
pub fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Render `message` as `target_chunks` chunk envelopes of 32 little-endian
/// u128 field elements each, in Aleo struct-literal syntax.
///
/// The output is a single line; indentation spaces are kept but newlines are
/// not. A one-chunk message looks like
/// `{  c0: {    f0: 1u128,    f1: 0u128, ...    f31: 0u128  }}`.
pub fn format_chunks(message: &[u8], target_chunks: usize) -> Result<String, EncodingError> {
    if !(1..=MAX_TARGET_CHUNKS).contains(&target_chunks) {
        return Err(EncodingError::InvalidChunkCount(target_chunks));
    }
    if message.is_empty() {
        return Err(EncodingError::MessageTooShort(0));
    }
    if message.len() > target_chunks * FORMAT_CHUNK_SIZE {
        return Err(EncodingError::MessageTooLongForChunks {
            len: message.len(),
            target_chunks,
        });
    }

    let mut out = String::from("{");
    for chunk in 0..target_chunks {
        out.push_str(&format!("  c{chunk}: {{"));
        for field in 0..FIELDS_PER_CHUNK {
            let start = chunk * FORMAT_CHUNK_SIZE + field * FIELD_ELEMENT_SIZE;
            let value = if start >= message.len() {
                0
            } else {
                let end = (start + FIELD_ELEMENT_SIZE).min(message.len());
                to_u128_le(&message[start..end])?
            };
            out.push_str(&format!("    f{field}: {value}u128,"));
        }
        // Struct literals carry no trailing comma.
        out.pop();
        out.push_str("  },");
    }
    out.pop();
    out.push('}');
    Ok(out)
}

/// Number of formatting chunks needed to carry `len` bytes.
pub fn chunks_for_len(len: usize) -> usize {
    len.div_ceil(FORMAT_CHUNK_SIZE).max(1)
}
