/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Candidates suppressed by a fully transparent ancestor.
//!
//! When the paint walk is inside a subtree whose only reason for being
//! invisible is an `opacity: 0` ancestor, candidates are diverted here
//! instead of into the normal ledgers. Only the single largest diverted
//! candidate per ledger is retained; if the ancestor later becomes visible
//! the held candidates are promoted into the normal ledgers with their
//! original first sizes.

use crate::FrameRect;
use crate::candidate::LCPCandidateID;

#[derive(Clone, Copy, Debug)]
pub(crate) struct IgnoredImage {
    pub id: LCPCandidateID,
    pub first_size: usize,
    pub encoded_size: usize,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct IgnoredText {
    pub id: LCPCandidateID,
    pub first_size: usize,
    pub element_timing_rect: FrameRect,
}

/// O(1) memory: one held candidate per ledger, smaller ones are discarded on
/// arrival. Ties keep the earlier candidate, consistent with the ledgers'
/// insertion-order tie-break.
#[derive(Default)]
pub struct IgnoredContentTracker {
    largest_image: Option<IgnoredImage>,
    largest_text: Option<IgnoredText>,
}

impl IgnoredContentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_image(&mut self, candidate: IgnoredImage) {
        if candidate.first_size == 0 {
            return;
        }
        let held = self.largest_image.map_or(0, |image| image.first_size);
        if candidate.first_size > held {
            self.largest_image = Some(candidate);
        }
    }

    pub(crate) fn record_text(&mut self, candidate: IgnoredText) {
        if candidate.first_size == 0 {
            return;
        }
        let held = self.largest_text.map_or(0, |text| text.first_size);
        if candidate.first_size > held {
            self.largest_text = Some(candidate);
        }
    }

    pub(crate) fn take_image(&mut self) -> Option<IgnoredImage> {
        self.largest_image.take()
    }

    pub(crate) fn take_text(&mut self) -> Option<IgnoredText> {
        self.largest_text.take()
    }

    /// Drops a held candidate whose owning element was removed.
    pub fn forget(&mut self, id: LCPCandidateID) {
        if self.largest_image.is_some_and(|image| image.id == id) {
            self.largest_image = None;
        }
        if self.largest_text.is_some_and(|text| text.id == id) {
            self.largest_text = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.largest_image.is_none() && self.largest_text.is_none()
    }
}
