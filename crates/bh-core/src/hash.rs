/// One-at-a-time mixing over `bytes`, continuing from `current`.
pub fn mix_bytes(current: u32, bytes: &[u8]) -> u32 {
    let mut hash = current;
    for byte in bytes {
        hash = hash.wrapping_add(u32::from(*byte));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash
}

/// Final avalanche step; call once after all inputs are mixed.
pub fn finish(current: u32) -> u32 {
    let mut hash = current;
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}
