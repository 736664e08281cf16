//! Platform-wide constants shared by every accelerator build.

/// Bytes per bus word.
pub const WORD_BYTES: usize = 4;

/// Elements per streaming burst on the DRAM engines.
pub const BURST_ELEMENTS: usize = 16;

/// Byte alignment the streaming engines require for `byteCount`
/// (one full burst of 32-bit elements).
pub const STREAM_ALIGNMENT: usize = BURST_ELEMENTS * WORD_BYTES;

/// Alignment the allocators give physical buffer start addresses.
pub const BUFFER_ADDR_ALIGNMENT: u64 = STREAM_ALIGNMENT as u64;

/// Returns `true` if `byte_count` is a whole number of bursts.
#[must_use]
pub const fn is_stream_aligned(byte_count: usize) -> bool {
    byte_count % STREAM_ALIGNMENT == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_alignment_is_sixteen_words() {
        assert_eq!(STREAM_ALIGNMENT, 64);
        assert!(is_stream_aligned(0));
        assert!(is_stream_aligned(128));
        assert!(!is_stream_aligned(60));
    }
}
