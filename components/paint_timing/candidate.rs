/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Candidate records for Largest Contentful Paint and their ranking order.

use std::cmp::Ordering;
use std::time::Instant;

use crate::FrameRect;

/// The identity of a content element, assigned by the paint walk. Unique
/// while the element exists and never reused after removal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LCPCandidateID(pub usize);

impl LCPCandidateID {
    pub const INVALID: LCPCandidateID = LCPCandidateID(0);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for LCPCandidateID {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Monotonic generation counter identifying one rendering pass. Used to
/// causally order presentation confirmations, which may otherwise resolve
/// out of submission order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    pub fn next(&self) -> FrameIndex {
        FrameIndex(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentfulPaintType {
    Image,
    Text,
}

/// What the paint walk knows about the media resource backing an image.
#[derive(Clone, Copy, Debug)]
pub struct ImagePaintInfo {
    /// The encoded file size of the image in bytes, used by the entropy
    /// heuristic to exclude low-content images.
    pub encoded_size_in_bytes: usize,
    /// Whether enough of the image has been decoded to paint it meaningfully.
    pub is_sufficiently_loaded: bool,
}

/// The LCP candidate image.
#[derive(Clone, Debug)]
pub struct ImageRecord {
    id: LCPCandidateID,
    /// The visual area the first time the image was observed. Permanent:
    /// later resizes never update it.
    first_size: usize,
    /// The encoded file size of the image in bytes.
    encoded_size: usize,
    insertion_index: u64,
    /// The rendering frame in which the record was last queued for
    /// presentation confirmation.
    frame_index: FrameIndex,
    paint_time: Option<Instant>,
    loaded: bool,
}

impl ImageRecord {
    pub(crate) fn new(
        id: LCPCandidateID,
        first_size: usize,
        encoded_size: usize,
        insertion_index: u64,
        frame_index: FrameIndex,
        loaded: bool,
    ) -> Self {
        Self {
            id,
            first_size,
            encoded_size,
            insertion_index,
            frame_index,
            paint_time: None,
            loaded,
        }
    }

    pub fn id(&self) -> LCPCandidateID {
        self.id
    }

    pub fn first_size(&self) -> usize {
        self.first_size
    }

    pub fn paint_time(&self) -> Option<Instant> {
        self.paint_time
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    /// Bits of encoded data per displayed pixel. Used to judge whether the
    /// image is low-content (a tracking pixel stretched large, a flat
    /// background fill).
    pub fn image_entropy(&self) -> f64 {
        if self.first_size == 0 {
            return 0.0;
        }
        (self.encoded_size as f64 * 8.0) / (self.first_size as f64)
    }

    pub(crate) fn set_loaded(&mut self) {
        self.loaded = true;
    }

    /// Updates the encoded byte count once the load completes; the value
    /// observed at creation may predate the full response body.
    pub(crate) fn set_encoded_size(&mut self, encoded_size: usize) {
        self.encoded_size = encoded_size;
    }

    pub(crate) fn requeue(&mut self, frame_index: FrameIndex) {
        self.frame_index = frame_index;
    }

    pub(crate) fn set_paint_time(&mut self, paint_time: Instant) {
        if self.paint_time.is_none() {
            self.paint_time = Some(paint_time);
        }
    }

    pub(crate) fn rank(&self) -> CandidateRank {
        CandidateRank {
            size: self.first_size,
            insertion_index: self.insertion_index,
            id: self.id,
        }
    }
}

/// The LCP candidate text block. One record exists per block container; the
/// paint walk unions the visual rectangles of all descendant text into it
/// before the record is created.
#[derive(Clone, Debug)]
pub struct TextRecord {
    /// The id of the aggregating block container, not of any one text node.
    id: LCPCandidateID,
    first_size: usize,
    /// The unclipped frame-local rectangle reported to element timing,
    /// distinct from the clipped root-relative rectangle that determined
    /// `first_size`.
    element_timing_rect: FrameRect,
    insertion_index: u64,
    frame_index: FrameIndex,
    paint_time: Option<Instant>,
}

impl TextRecord {
    pub(crate) fn new(
        id: LCPCandidateID,
        first_size: usize,
        element_timing_rect: FrameRect,
        insertion_index: u64,
        frame_index: FrameIndex,
    ) -> Self {
        Self {
            id,
            first_size,
            element_timing_rect,
            insertion_index,
            frame_index,
            paint_time: None,
        }
    }

    pub fn id(&self) -> LCPCandidateID {
        self.id
    }

    pub fn first_size(&self) -> usize {
        self.first_size
    }

    pub fn element_timing_rect(&self) -> FrameRect {
        self.element_timing_rect
    }

    pub fn paint_time(&self) -> Option<Instant> {
        self.paint_time
    }

    pub fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    pub(crate) fn set_paint_time(&mut self, paint_time: Instant) {
        if self.paint_time.is_none() {
            self.paint_time = Some(paint_time);
        }
    }

    pub(crate) fn rank(&self) -> CandidateRank {
        CandidateRank {
            size: self.first_size,
            insertion_index: self.insertion_index,
            id: self.id,
        }
    }
}

/// Ordering key for the pending ranked sets: larger first, then earlier
/// insertion first. `insertion_index` is unique per ledger, so two distinct
/// candidates never compare equal.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CandidateRank {
    pub size: usize,
    pub insertion_index: u64,
    pub id: LCPCandidateID,
}

impl Ord for CandidateRank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .size
            .cmp(&self.size)
            .then(self.insertion_index.cmp(&other.insertion_index))
    }
}

impl PartialOrd for CandidateRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CandidateRank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CandidateRank {}

/// The lightweight view of a ledger's current largest candidate that the
/// calculator merges.
#[derive(Clone, Copy, Debug)]
pub struct LCPCandidate {
    pub id: LCPCandidateID,
    pub lcp_type: ContentfulPaintType,
    pub area: usize,
    pub paint_time: Option<Instant>,
    /// Measured entropy in bits per pixel. Only present for images.
    pub entropy: Option<f64>,
}

impl From<&ImageRecord> for LCPCandidate {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id(),
            lcp_type: ContentfulPaintType::Image,
            area: record.first_size(),
            paint_time: record.paint_time(),
            entropy: Some(record.image_entropy()),
        }
    }
}

impl From<&TextRecord> for LCPCandidate {
    fn from(record: &TextRecord) -> Self {
        Self {
            id: record.id(),
            lcp_type: ContentfulPaintType::Text,
            area: record.first_size(),
            paint_time: record.paint_time(),
            entropy: None,
        }
    }
}

/// A largest-contentful-paint report, emitted by the calculator whenever the
/// confirmed global largest grows.
#[derive(Clone, Copy, Debug)]
pub struct LargestContentfulPaint {
    pub id: LCPCandidateID,
    pub lcp_type: ContentfulPaintType,
    pub area: usize,
    pub paint_time: Instant,
    pub entropy: Option<f64>,
    /// Bumped once per emitted report.
    pub candidate_index: u64,
}
