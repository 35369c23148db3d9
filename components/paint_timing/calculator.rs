/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Merging of the per-ledger largests into the one reported
//! largest-contentful-paint signal.

use std::time::Instant;

use log::debug;

use crate::RootSize;
use crate::candidate::{LCPCandidate, LargestContentfulPaint};

/// The performance-observability consumer of this engine. Also supplies the
/// two pieces of environment the engine needs: current viewport geometry and
/// the first-contentful-paint gate that suppresses observation before it
/// fires.
pub trait ObservabilitySink {
    fn viewport_size(&self) -> RootSize;
    /// Candidate tracking only runs once a first contentful paint exists.
    fn first_contentful_paint_recorded(&self) -> bool;
    fn report_candidate(&mut self, report: &LargestContentfulPaint);
    /// Terminal notification: the engine froze and will never report again.
    fn report_frozen(&mut self);
}

/// Sole mutator of the publicly observed "largest contentful paint
/// time/size" pair. Every other component only supplies candidates.
#[derive(Default)]
pub struct LargestContentfulPaintCalculator {
    last_reported: Option<(Instant, usize)>,
    candidate_index: u64,
}

impl LargestContentfulPaintCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the two ledgers' current largests and reports to the sink if
    /// the confirmed global largest grew. A winner without a paint time is
    /// never reported; the caller re-runs the merge once presentation
    /// resolves.
    pub fn maybe_report(
        &mut self,
        largest_image: Option<LCPCandidate>,
        largest_text: Option<LCPCandidate>,
        sink: &mut dyn ObservabilitySink,
    ) -> Option<LargestContentfulPaint> {
        let winner = Self::merge(largest_image, largest_text)?;
        let paint_time = winner.paint_time?;

        // Already-reported maxima are never retracted; only strictly larger
        // candidates produce a new report.
        let last_size = self.last_reported.map_or(0, |(_, size)| size);
        if winner.area <= last_size {
            return None;
        }

        self.candidate_index += 1;
        let report = LargestContentfulPaint {
            id: winner.id,
            lcp_type: winner.lcp_type,
            area: winner.area,
            paint_time,
            entropy: winner.entropy,
            candidate_index: self.candidate_index,
        };
        self.last_reported = Some((paint_time, winner.area));
        debug!(
            "largest contentful paint candidate {}: {:?} {:?}, area {}",
            report.candidate_index, report.lcp_type, report.id, report.area,
        );
        sink.report_candidate(&report);
        Some(report)
    }

    /// Tie-breaks are load-bearing for determinism: on equal size, a
    /// confirmed candidate beats an unconfirmed one, and the image candidate
    /// beats the text candidate when both or neither are confirmed.
    fn merge(
        largest_image: Option<LCPCandidate>,
        largest_text: Option<LCPCandidate>,
    ) -> Option<LCPCandidate> {
        match (largest_image, largest_text) {
            (None, None) => None,
            (Some(candidate), None) | (None, Some(candidate)) => Some(candidate),
            (Some(image), Some(text)) => {
                if image.area > text.area {
                    Some(image)
                } else if text.area > image.area {
                    Some(text)
                } else if image.paint_time.is_none() && text.paint_time.is_some() {
                    Some(text)
                } else {
                    Some(image)
                }
            },
        }
    }

    /// The last reported (paint time, size) pair. Remains readable after the
    /// engine freezes.
    pub fn last_reported(&self) -> Option<(Instant, usize)> {
        self.last_reported
    }

    pub fn candidate_index(&self) -> u64 {
        self.candidate_index
    }
}
