#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use tau_probe::ogg::{CAPTURE_PATTERN, PAGE_HEADER_LEN};

/// Builds a minimal Ogg page carrying `packet` as its only segment run.
pub fn page_with_packet(packet: &[u8]) -> Bytes {
    let mut segments = Vec::new();
    let mut remaining = packet.len();
    loop {
        let lace = remaining.min(255);
        segments.push(lace as u8);
        remaining -= lace;
        if lace < 255 {
            break;
        }
    }

    let mut page = BytesMut::with_capacity(PAGE_HEADER_LEN + segments.len() + packet.len());
    page.extend_from_slice(CAPTURE_PATTERN);
    page.extend_from_slice(&[0u8; 22]);
    page.extend_from_slice(&[segments.len() as u8]);
    page.extend_from_slice(&segments);
    page.extend_from_slice(packet);
    page.freeze()
}

pub fn opus_head() -> Bytes {
    page_with_packet(b"OpusHead\x01\x01\x38\x01\x80\xbb\x00\x00\x00\x00\x00")
}

pub fn opus_tags() -> Bytes {
    page_with_packet(b"OpusTags\x03\x00\x00\x00tau\x00\x00\x00\x00")
}
