/// XORs `buf` in place with the repeating 4-byte `key`.
///
/// The key is applied starting at key index 0, so `buf` must begin at the first payload byte.
/// Masking and unmasking are the same operation.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let word = u32::from_ne_bytes(key);

    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(chunk);
        chunk.copy_from_slice(&(u32::from_ne_bytes(bytes) ^ word).to_ne_bytes());
    }

    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}

/// Generates a fresh random masking key.
#[inline]
pub fn random_key() -> [u8; 4] {
    rand::random()
}
