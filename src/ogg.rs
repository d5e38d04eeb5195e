//! Just enough Ogg page parsing to tell Opus header pages from audio pages.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// Fixed part of an Ogg page header, up to and including the segment count.
pub const PAGE_HEADER_LEN: usize = 27;
const MAGIC_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    /// Identification header (`OpusHead`).
    OpusHead,
    /// Comment header (`OpusTags`).
    OpusTags,
    Audio,
}

impl PageKind {
    pub fn is_header(&self) -> bool {
        matches!(self, PageKind::OpusHead | PageKind::OpusTags)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OggError {
    #[error("Page too short: {0} bytes")]
    TooShort(usize),

    #[error("Missing OggS capture pattern")]
    BadCapture,
}

pub fn classify(page: &[u8]) -> Result<PageKind, OggError> {
    if page.len() < PAGE_HEADER_LEN {
        return Err(OggError::TooShort(page.len()));
    }
    if &page[..4] != CAPTURE_PATTERN {
        return Err(OggError::BadCapture);
    }

    let body = PAGE_HEADER_LEN + page[26] as usize;
    // A page whose first packet is shorter than a magic cannot be a header.
    let Some(magic) = page.get(body..body + MAGIC_LEN) else {
        return Ok(PageKind::Audio);
    };

    Ok(match magic {
        b"OpusHead" => PageKind::OpusHead,
        b"OpusTags" => PageKind::OpusTags,
        _ => PageKind::Audio,
    })
}

pub fn is_header(page: &[u8]) -> bool {
    classify(page).is_ok_and(|k| k.is_header())
}

/// Collects the Opus header pages of a stream so late listeners can be primed.
///
/// Header pages accumulate until the first audio page, at which point they are
/// frozen into one buffer. A header page arriving after that starts a new
/// collection (the upstream restarted its stream).
#[derive(Debug, Default)]
pub struct HeaderCache {
    pending: Vec<Bytes>,
    frozen: Option<Bytes>,
}

impl HeaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one page. Returns `true` when the page was a header and got cached.
    pub fn offer(&mut self, page: &Bytes) -> bool {
        if is_header(page) {
            if self.frozen.is_some() {
                self.frozen = None;
                self.pending.clear();
            }
            self.pending.push(page.clone());
            return true;
        }

        if self.frozen.is_none() && !self.pending.is_empty() {
            let total = self.pending.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(total);
            for p in self.pending.drain(..) {
                buf.extend_from_slice(&p);
            }
            self.frozen = Some(buf.freeze());
        }
        false
    }

    /// Concatenated header pages, once the first audio page went by.
    pub fn headers(&self) -> Option<Bytes> {
        self.frozen.clone()
    }
}
