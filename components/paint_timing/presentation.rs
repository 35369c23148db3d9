/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Batching of presentation-timestamp confirmations.
//!
//! Asking the host compositor "when were this frame's pixels actually shown"
//! is expensive and rate limited, while the paint walk produces candidates
//! far more often. The [`PresentationScheduler`] coalesces every candidate
//! queued within one rendering frame into a single outstanding request. The
//! records awaiting the timestamp queue with their owning ledgers; when a
//! request resolves, each ledger drains its queue up to the resolved frame.

use rustc_hash::FxHashMap;

use crate::candidate::FrameIndex;

/// Identifies one submitted confirmation batch. The host compositor echoes
/// the token back when the frame's pixels are confirmed visible.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PresentationRequestToken(u64);

/// The host compositor's one-shot "notify me when this frame's pixels are
/// shown" primitive. The request resolves asynchronously on another thread;
/// the resolution must be posted back to the owning main thread (through a
/// [`WeakPaintTimingDetector`](crate::WeakPaintTimingDetector)) before any
/// ledger state is touched.
pub trait HostCompositor {
    fn request_presentation_timestamp(&self, token: PresentationRequestToken, frame: FrameIndex);
}

/// Coalesces per-frame confirmation requests into one compositor request
/// each. Multiple batches may be in flight at once; they may resolve out of
/// submission order, and [`FrameIndex`] comparisons remain the authority for
/// causal ordering.
#[derive(Default)]
pub struct PresentationScheduler {
    /// Confirmations queued with the ledgers since the last submission.
    queued_in_open_batch: usize,
    in_flight: FxHashMap<PresentationRequestToken, FrameIndex>,
    next_token: u64,
}

impl PresentationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one deferred confirmation into the current open batch. The
    /// record itself queues with its owning ledger; no synchronous work
    /// occurs here.
    pub fn register(&mut self) {
        self.queued_in_open_batch += 1;
    }

    /// Closes the current batch and submits it to the host compositor as a
    /// single request, tagged with the given frame. Returns `None` when no
    /// candidate was queued this frame.
    pub fn finish_frame(
        &mut self,
        frame_index: FrameIndex,
        compositor: &dyn HostCompositor,
    ) -> Option<PresentationRequestToken> {
        if self.queued_in_open_batch == 0 {
            return None;
        }
        self.queued_in_open_batch = 0;

        let token = PresentationRequestToken(self.next_token);
        self.next_token += 1;
        self.in_flight.insert(token, frame_index);
        compositor.request_presentation_timestamp(token, frame_index);
        Some(token)
    }

    /// Claims the frame for a resolved request. Returns `None` for a token
    /// that was never submitted or already resolved, which the caller must
    /// treat as a silent no-op.
    pub(crate) fn take_resolved(&mut self, token: PresentationRequestToken) -> Option<FrameIndex> {
        self.in_flight.remove(&token)
    }

    /// Number of submitted batches still awaiting resolution. Bounded by the
    /// number of frames painted since the oldest unresolved one.
    pub fn in_flight_batches(&self) -> usize {
        self.in_flight.len()
    }

    pub fn has_open_batch(&self) -> bool {
        self.queued_in_open_batch > 0
    }
}
