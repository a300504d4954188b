// src/scanning/checksum.rs

//! Page digests carried in capture reports, so subscribers can spot a device
//! returning the same frame twice without comparing buffers.

use twox_hash::XxHash64;

/// `XxHash64` (seed 0) of one captured page.
pub fn page_digest(page: &[u8]) -> u64 {
    XxHash64::oneshot(0, page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_content_based() {
        assert_eq!(page_digest(b"page one"), page_digest(b"page one"));
        assert_ne!(page_digest(b"page one"), page_digest(b"page two"));
    }
}
