/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The text candidate ledger.
//!
//! Text nodes are not tracked individually. The nearest enclosing block
//! container accumulates the union of its descendant text rectangles during
//! one paint walk, and one candidate is created per container when the walk
//! finishes, the first time the union is non-empty. A container that already
//! has a record is never re-aggregated; its first size is permanent.

use std::collections::BTreeSet;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::candidate::{CandidateRank, FrameIndex, LCPCandidateID, TextRecord};
use crate::presentation::PresentationScheduler;
use crate::{FrameRect, LCPCandidate, RootRect};

struct AggregatedText {
    /// Union of the clipped root-relative text rectangles; its area becomes
    /// the candidate's first size.
    root_rect: RootRect,
    /// Union of the unclipped frame-local rectangles reported to element
    /// timing.
    element_timing_rect: FrameRect,
}

/// Tracks every text-block candidate of one frame view. Same container
/// discipline as the image ledger: the arena map owns each record, which is
/// otherwise in the ranked set or the finalized-largest slot, never both.
pub struct TextRecordsManager {
    records: FxHashMap<LCPCandidateID, TextRecord>,
    /// Containers a creation decision was made for. Never re-aggregated.
    recorded: FxHashSet<LCPCandidateID>,
    ranked: BTreeSet<CandidateRank>,
    largest_painted: Option<LCPCandidateID>,
    /// Records awaiting a presentation timestamp, in queue order, each tagged
    /// with the frame it was queued in.
    queued_for_paint_time: Vec<(LCPCandidateID, FrameIndex)>,
    insertion_count: u64,
    /// Unions accumulated during the current paint walk, in first-seen order.
    aggregating: FxHashMap<LCPCandidateID, AggregatedText>,
    aggregation_order: Vec<LCPCandidateID>,
}

impl TextRecordsManager {
    pub fn new() -> Self {
        Self {
            records: FxHashMap::default(),
            recorded: FxHashSet::default(),
            ranked: BTreeSet::new(),
            largest_painted: None,
            queued_for_paint_time: Vec::new(),
            insertion_count: 0,
            aggregating: FxHashMap::default(),
            aggregation_order: Vec::new(),
        }
    }

    /// Accumulates one painted text rectangle into its block container's
    /// union for the current paint walk.
    pub fn aggregate(
        &mut self,
        container: LCPCandidateID,
        root_rect: &RootRect,
        element_timing_rect: &FrameRect,
    ) {
        if !container.is_valid() || self.recorded.contains(&container) {
            return;
        }
        match self.aggregating.get_mut(&container) {
            Some(aggregated) => {
                aggregated.root_rect = aggregated.root_rect.union(root_rect);
                aggregated.element_timing_rect =
                    aggregated.element_timing_rect.union(element_timing_rect);
            },
            None => {
                self.aggregation_order.push(container);
                self.aggregating.insert(
                    container,
                    AggregatedText {
                        root_rect: *root_rect,
                        element_timing_rect: *element_timing_rect,
                    },
                );
            },
        }
    }

    /// Finishes the current paint walk: creates a record for every container
    /// whose aggregated union is non-empty and queues it for confirmation.
    pub fn commit(&mut self, frame_index: FrameIndex, scheduler: &mut PresentationScheduler) {
        let mut aggregating = std::mem::take(&mut self.aggregating);
        for container in self.aggregation_order.drain(..) {
            let Some(aggregated) = aggregating.remove(&container) else {
                continue;
            };
            let size = aggregated.root_rect.size.area() as usize;
            if size == 0 {
                // An empty union does not consume the container's one
                // creation opportunity.
                continue;
            }
            self.recorded.insert(container);
            if size <= Self::largest_painted_size(&self.records, self.largest_painted) {
                continue;
            }

            let record = TextRecord::new(
                container,
                size,
                aggregated.element_timing_rect,
                self.insertion_count,
                frame_index,
            );
            self.insertion_count += 1;
            self.ranked.insert(record.rank());
            self.queued_for_paint_time.push((container, frame_index));
            scheduler.register();
            self.records.insert(container, record);
        }
    }

    /// Inserts a container previously held by the ignored-content tracker,
    /// as if freshly committed with its original first size.
    pub(crate) fn insert_promoted(
        &mut self,
        id: LCPCandidateID,
        first_size: usize,
        element_timing_rect: FrameRect,
        frame_index: FrameIndex,
        scheduler: &mut PresentationScheduler,
    ) -> bool {
        if !id.is_valid() || first_size == 0 || self.recorded.contains(&id) {
            return false;
        }
        self.recorded.insert(id);
        if first_size <= Self::largest_painted_size(&self.records, self.largest_painted) {
            return false;
        }

        let record = TextRecord::new(
            id,
            first_size,
            element_timing_rect,
            self.insertion_count,
            frame_index,
        );
        self.insertion_count += 1;
        self.ranked.insert(record.rank());
        self.queued_for_paint_time.push((id, frame_index));
        scheduler.register();
        self.records.insert(id, record);
        true
    }

    /// Drains this ledger's confirmation queue for a resolved batch; same
    /// frame-ordering rules as the image ledger.
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

    /// Delivers a resolved presentation timestamp to one queued record; see
    /// the image ledger for the re-queue rules.
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
        record.set_paint_time(paint_time);
        self.promote_painted(id);
    }

    fn promote_painted(&mut self, id: LCPCandidateID) {
        let Some(rank) = self.records.get(&id).map(TextRecord::rank) else {
            return;
        };
        if rank.size <= Self::largest_painted_size(&self.records, self.largest_painted) {
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

    /// Purges the container from every internal container. Idempotent.
    pub fn remove(&mut self, id: LCPCandidateID) {
        self.recorded.remove(&id);
        self.queued_for_paint_time
            .retain(|&(queued, _)| queued != id);
        if let Some(position) = self.aggregation_order.iter().position(|&c| c == id) {
            self.aggregation_order.remove(position);
            self.aggregating.remove(&id);
        }
        if let Some(record) = self.records.remove(&id) {
            self.ranked.remove(&record.rank());
            if self.largest_painted == Some(id) {
                self.largest_painted = None;
            }
        }
    }

    /// The current largest text candidate, ties favoring the finalized one.
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

    pub fn record(&self, id: LCPCandidateID) -> Option<&TextRecord> {
        self.records.get(&id)
    }

    pub fn tracked_candidate_count(&self) -> usize {
        self.records.len()
    }

    fn largest_painted_size(
        records: &FxHashMap<LCPCandidateID, TextRecord>,
        largest_painted: Option<LCPCandidateID>,
    ) -> usize {
        largest_painted
            .and_then(|id| records.get(&id))
            .map_or(0, TextRecord::first_size)
    }
}

impl Default for TextRecordsManager {
    fn default() -> Self {
        Self::new()
    }
}
