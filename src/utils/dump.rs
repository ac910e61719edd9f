//! Hex dumps of frames and digests.

use hexplay::HexViewBuilder;
use log::{debug, log_enabled, Level::Debug};

use crate::protocol::Digest;

/// Dump `bytes` in a hex table at debug level.
pub(crate) fn dump(label: &str, bytes: &[u8]) {
    if log_enabled!(Debug) {
        let view = HexViewBuilder::new(bytes)
            .address_offset(0)
            .row_width(16)
            .finish();
        debug!("{} ({} bytes):\n{}", label, bytes.len(), view);
    }
}

/// Four space separated groups of 16 hex digits.
pub fn format_digest(digest: &Digest) -> String {
    digest
        .chunks(8)
        .map(|group| group.iter().map(|b| format!("{:02x}", b)).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn digest_groups() {
    let mut digest = [0u8; 32];
    digest[0] = 0xde;
    digest[8] = 0xad;
    digest[31] = 0x01;
    assert_eq!(
        format_digest(&digest),
        "de00000000000000 ad00000000000000 0000000000000000 0000000000000001"
    );
}
