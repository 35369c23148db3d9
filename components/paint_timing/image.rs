/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The image candidate ledger.
//!
//! Decides, for each image paint observation, whether a candidate record
//! should be created, updates load state on re-observation, and maintains
//! the size-ranked set of live candidates plus the currently finalized
//! (painted) largest.

use std::collections::BTreeSet;
use std::time::Instant;

use euclid::default::Size2D as IntrinsicSize;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::candidate::{CandidateRank, FrameIndex, ImagePaintInfo, ImageRecord, LCPCandidateID};
use crate::presentation::PresentationScheduler;
use crate::{FrameRect, LCPCandidate, PaintTimingConfig, RootRect, RootSize};

/// The visual size of an image after the corrective heuristics, plus whether
/// the full-viewport exclusion fired.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CorrectedSize {
    pub size: usize,
    pub is_full_viewport: bool,
}

/// Applies the two mandatory corrections to an image's root-relative area:
/// full-bleed images are forced to zero (they are usually decorative
/// backgrounds and would dominate every page), and an image displayed larger
/// than its intrinsic resolution is scaled back down to the area it actually
/// carries detail for.
pub(crate) fn corrected_image_size(
    root_rect: &RootRect,
    intrinsic_size: &IntrinsicSize<f32>,
    viewport: &RootSize,
) -> CorrectedSize {
    let displayed_area = root_rect.size.area() as f64;
    let viewport_area = viewport.area() as f64;
    if viewport_area > 0.0 && displayed_area >= viewport_area {
        return CorrectedSize {
            size: 0,
            is_full_viewport: true,
        };
    }

    let mut size = displayed_area;
    let intrinsic_area = intrinsic_size.area() as f64;
    if displayed_area > 0.0 && intrinsic_area > 0.0 && intrinsic_area < displayed_area {
        size = displayed_area * (intrinsic_area / displayed_area);
    }
    CorrectedSize {
        size: size as usize,
        is_full_viewport: false,
    }
}

/// Tracks every image candidate of one frame view.
///
/// A record lives in the arena map for its whole life. It is additionally in
/// exactly one of: the size-ranked set, or the finalized-largest slot. When a
/// newly painted record beats the finalized largest the two swap places, so
/// removal of the current largest falls back to the next-best candidate.
pub struct ImageRecordsManager {
    /// Arena of all live records, keyed by element id.
    records: FxHashMap<LCPCandidateID, ImageRecord>,
    /// Every id a creation decision was ever made for, including rejections.
    /// Ids are never reused, so a rejection is permanent.
    recorded: FxHashSet<LCPCandidateID>,
    /// Live records except the finalized largest, ranked larger-first then
    /// earlier-insertion-first.
    ranked: BTreeSet<CandidateRank>,
    /// The largest record whose paint has been confirmed, if any.
    largest_painted: Option<LCPCandidateID>,
    /// Records awaiting a presentation timestamp, in queue order, each tagged
    /// with the frame it was queued in.
    queued_for_paint_time: Vec<(LCPCandidateID, FrameIndex)>,
    insertion_count: u64,
    seen_full_viewport_image: bool,
    config: PaintTimingConfig,
}

impl ImageRecordsManager {
    pub fn new(config: PaintTimingConfig) -> Self {
        Self {
            records: FxHashMap::default(),
            recorded: FxHashSet::default(),
            ranked: BTreeSet::new(),
            largest_painted: None,
            queued_for_paint_time: Vec::new(),
            insertion_count: 0,
            seen_full_viewport_image: false,
            config,
        }
    }

    /// Handles one image paint observation. Returns whether the observation
    /// changed ledger state (a record was created, or an existing record
    /// became loaded and was queued for confirmation).
    ///
    /// `root_rect` must already be clipped to every containing viewport by
    /// the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        id: LCPCandidateID,
        frame_rect: &FrameRect,
        root_rect: &RootRect,
        intrinsic_size: &IntrinsicSize<f32>,
        paint_info: &ImagePaintInfo,
        viewport: &RootSize,
        frame_index: FrameIndex,
        scheduler: &mut PresentationScheduler,
    ) -> bool {
        if !id.is_valid() || frame_rect.is_empty() {
            return false;
        }

        if self.records.contains_key(&id) {
            return self.observe_existing(id, paint_info, frame_index, scheduler);
        }
        if self.recorded.contains(&id) {
            return false;
        }

        let corrected = corrected_image_size(root_rect, intrinsic_size, viewport);
        self.seen_full_viewport_image |= corrected.is_full_viewport;
        self.recorded.insert(id);

        if corrected.size == 0 {
            return false;
        }
        // The entropy decision waits until the encoded byte count is
        // trustworthy, so a record created before its image finished loading
        // passes through here unfiltered and is judged in
        // `observe_existing` once the load completes.
        if paint_info.is_sufficiently_loaded &&
            self.rejected_for_low_entropy(id, paint_info.encoded_size_in_bytes, corrected.size)
        {
            return false;
        }
        // A candidate that cannot beat the finalized largest can never
        // become the global largest, so it is not worth tracking. `<=`
        // because an equal-size newcomer loses the stability tie-break.
        if corrected.size <= self.largest_painted_size() {
            return false;
        }

        let record = ImageRecord::new(
            id,
            corrected.size,
            paint_info.encoded_size_in_bytes,
            self.insertion_count,
            frame_index,
            paint_info.is_sufficiently_loaded,
        );
        self.insertion_count += 1;
        self.ranked.insert(record.rank());
        if record.is_loaded() {
            self.queued_for_paint_time.push((id, frame_index));
            scheduler.register();
        }
        self.records.insert(id, record);
        true
    }

    /// Re-observation of a tracked record, e.g. after a style change before
    /// the image finished loading. `first_size` is permanent; only the load
    /// state can advance, and the deferred entropy decision is made here with
    /// the now-final encoded byte count.
    fn observe_existing(
        &mut self,
        id: LCPCandidateID,
        paint_info: &ImagePaintInfo,
        frame_index: FrameIndex,
        scheduler: &mut PresentationScheduler,
    ) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if record.is_loaded() || !paint_info.is_sufficiently_loaded {
            return false;
        }
        record.set_encoded_size(paint_info.encoded_size_in_bytes);
        let first_size = record.first_size();
        let rank = record.rank();
        if self.rejected_for_low_entropy(id, paint_info.encoded_size_in_bytes, first_size) {
            // The id stays in `recorded`: the rejection is permanent.
            self.ranked.remove(&rank);
            self.records.remove(&id);
            return false;
        }

        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        record.set_loaded();
        record.requeue(frame_index);
        self.queued_for_paint_time.push((id, frame_index));
        scheduler.register();
        true
    }

    fn rejected_for_low_entropy(
        &self,
        id: LCPCandidateID,
        encoded_bytes: usize,
        size: usize,
    ) -> bool {
        if !self.config.exclude_low_entropy_images {
            return false;
        }
        let bpp = (encoded_bytes as f64 * 8.0) / (size as f64);
        if bpp < self.config.minimum_image_bpp {
            debug!("image {id:?} below entropy threshold ({bpp:.3} bpp), not a candidate");
            return true;
        }
        false
    }

    /// Inserts a candidate previously held by the ignored-content tracker,
    /// as if it were freshly observed with its original first size. The
    /// record is loaded by construction (promotion requires renderable
    /// content) and is queued for confirmation immediately.
    pub(crate) fn insert_promoted(
        &mut self,
        id: LCPCandidateID,
        first_size: usize,
        encoded_size: usize,
        frame_index: FrameIndex,
        scheduler: &mut PresentationScheduler,
    ) -> bool {
        if !id.is_valid() || first_size == 0 || self.recorded.contains(&id) {
            return false;
        }
        self.recorded.insert(id);
        if first_size <= self.largest_painted_size() {
            return false;
        }

        let record = ImageRecord::new(
            id,
            first_size,
            encoded_size,
            self.insertion_count,
            frame_index,
            true,
        );
        self.insertion_count += 1;
        self.ranked.insert(record.rank());
        self.queued_for_paint_time.push((id, frame_index));
        scheduler.register();
        self.records.insert(id, record);
        true
    }

    /// Drains this ledger's confirmation queue for a resolved batch: every
    /// record queued in the resolved frame or earlier receives the timestamp,
    /// in queue order; entries queued in a later frame stay queued for a
    /// later resolution.
    pub fn assign_queued_paint_times(&mut self, resolved_frame: FrameIndex, paint_time: Instant) {
        let queued = std::mem::take(&mut self.queued_for_paint_time);
        for (id, frame_index) in queued {
            if frame_index > resolved_frame {
                self.queued_for_paint_time.push((id, frame_index));
                continue;
            }
            self.maybe_assign_paint_time(id, resolved_frame, paint_time);
        }
    }

    /// Delivers a resolved presentation timestamp to one queued record.
    /// Records re-queued in a frame later than the resolved batch are left
    /// for a later resolution; records that already have a paint time, or
    /// that were removed in the meantime, are untouched.
    pub fn maybe_assign_paint_time(
        &mut self,
        id: LCPCandidateID,
        batch_frame: FrameIndex,
        paint_time: Instant,
    ) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if record.frame_index() > batch_frame || record.paint_time().is_some() {
            return;
        }
        debug_assert!(record.is_loaded(), "only loaded records are queued");
        record.set_paint_time(paint_time);
        self.promote_painted(id);
    }

    /// Makes a freshly painted record the finalized largest if it strictly
    /// beats the current one; ties keep the incumbent. The displaced record
    /// re-enters the ranked set.
    fn promote_painted(&mut self, id: LCPCandidateID) {
        let Some(rank) = self.records.get(&id).map(ImageRecord::rank) else {
            return;
        };
        if rank.size <= self.largest_painted_size() {
            return;
        }
        if let Some(displaced) = self.largest_painted.take() {
            if let Some(displaced_record) = self.records.get(&displaced) {
                self.ranked.insert(displaced_record.rank());
            }
        }
        self.ranked.remove(&rank);
        self.largest_painted = Some(id);
    }

    /// Purges the candidate from every container. Idempotent; safe for an id
    /// that was never tracked.
    pub fn remove(&mut self, id: LCPCandidateID) {
        self.recorded.remove(&id);
        self.queued_for_paint_time
            .retain(|&(queued, _)| queued != id);
        if let Some(record) = self.records.remove(&id) {
            self.ranked.remove(&record.rank());
            if self.largest_painted == Some(id) {
                self.largest_painted = None;
            }
        }
    }

    /// The current largest image candidate: whichever of the finalized
    /// largest and the best-ranked live record has the greater first size,
    /// ties favoring the finalized one. O(1).
    pub fn largest(&self) -> Option<LCPCandidate> {
        let finalized = self
            .largest_painted
            .and_then(|id| self.records.get(&id));
        let best_ranked = self
            .ranked
            .first()
            .and_then(|rank| self.records.get(&rank.id));
        match (finalized, best_ranked) {
            (None, None) => None,
            (Some(record), None) | (None, Some(record)) => Some(record.into()),
            (Some(finalized), Some(ranked)) => {
                if ranked.first_size() > finalized.first_size() {
                    Some(ranked.into())
                } else {
                    Some(finalized.into())
                }
            },
        }
    }

    pub fn record(&self, id: LCPCandidateID) -> Option<&ImageRecord> {
        self.records.get(&id)
    }

    pub fn largest_painted_record(&self) -> Option<&ImageRecord> {
        self.largest_painted.and_then(|id| self.records.get(&id))
    }

    /// Whether an image covering the whole viewport was ever observed.
    /// Diagnostic only; such images are excluded from candidacy.
    pub fn seen_full_viewport_image(&self) -> bool {
        self.seen_full_viewport_image
    }

    pub fn tracked_candidate_count(&self) -> usize {
        self.records.len()
    }

    fn largest_painted_size(&self) -> usize {
        self.largest_painted_record()
            .map_or(0, ImageRecord::first_size)
    }
}
