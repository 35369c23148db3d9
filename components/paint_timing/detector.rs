/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The per-frame-view facade over the LCP pipeline.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::time::Instant;

use euclid::default::Size2D as IntrinsicSize;
use log::debug;

use crate::calculator::{LargestContentfulPaintCalculator, ObservabilitySink};
use crate::candidate::{FrameIndex, ImagePaintInfo, LCPCandidate, LCPCandidateID};
use crate::ignored::{IgnoredContentTracker, IgnoredImage, IgnoredText};
use crate::image::{ImageRecordsManager, corrected_image_size};
use crate::presentation::{HostCompositor, PresentationRequestToken, PresentationScheduler};
use crate::text::TextRecordsManager;
use crate::{FrameRect, PaintTimingConfig, RootRect};

/// Owns one of each pipeline component for a single frame view. Sub-frames
/// get entirely independent detectors; nothing here is shared across frames.
///
/// All methods must be called on the frame view's main thread. The host
/// compositor's resolutions arrive through [`WeakPaintTimingDetector`],
/// which the embedder's task queue uses to deliver them back onto the main
/// thread.
pub struct PaintTimingDetector {
    images: ImageRecordsManager,
    texts: TextRecordsManager,
    scheduler: PresentationScheduler,
    calculator: LargestContentfulPaintCalculator,
    ignored: IgnoredContentTracker,
    sink: Box<dyn ObservabilitySink>,
    current_frame: FrameIndex,
    frozen: bool,
    config: PaintTimingConfig,
}

impl PaintTimingDetector {
    pub fn new(sink: Box<dyn ObservabilitySink>, config: PaintTimingConfig) -> Self {
        Self {
            images: ImageRecordsManager::new(config),
            texts: TextRecordsManager::new(),
            scheduler: PresentationScheduler::new(),
            calculator: LargestContentfulPaintCalculator::new(),
            ignored: IgnoredContentTracker::new(),
            sink,
            current_frame: FrameIndex::default(),
            frozen: false,
            config,
        }
    }

    /// Reports one painted image to the engine. Returns whether the
    /// observation changed ledger state. Rectangles must already be clipped
    /// to every containing viewport by the paint walk.
    ///
    /// `suppressed_by_transparent_ancestor` diverts the candidate to the
    /// ignored-content tracker; it must only be set when a fully transparent
    /// ancestor is the *only* reason the image is invisible.
    pub fn observe_image(
        &mut self,
        id: LCPCandidateID,
        frame_rect: &FrameRect,
        root_rect: &RootRect,
        intrinsic_size: &IntrinsicSize<f32>,
        paint_info: &ImagePaintInfo,
        suppressed_by_transparent_ancestor: bool,
    ) -> bool {
        if !self.can_observe() {
            return false;
        }
        let viewport = self.sink.viewport_size();

        if suppressed_by_transparent_ancestor {
            if frame_rect.is_empty() || !paint_info.is_sufficiently_loaded {
                return false;
            }
            let corrected = corrected_image_size(root_rect, intrinsic_size, &viewport);
            if corrected.size == 0 {
                return false;
            }
            if self.config.exclude_low_entropy_images {
                let bpp =
                    (paint_info.encoded_size_in_bytes as f64 * 8.0) / (corrected.size as f64);
                if bpp < self.config.minimum_image_bpp {
                    return false;
                }
            }
            self.ignored.record_image(IgnoredImage {
                id,
                first_size: corrected.size,
                encoded_size: paint_info.encoded_size_in_bytes,
            });
            return false;
        }

        self.images.observe(
            id,
            frame_rect,
            root_rect,
            intrinsic_size,
            paint_info,
            &viewport,
            self.current_frame,
            &mut self.scheduler,
        )
    }

    /// Reports one painted text rectangle, accumulated under its nearest
    /// block container. Candidates materialize when the frame finishes.
    pub fn aggregate_text(
        &mut self,
        container: LCPCandidateID,
        root_rect: &RootRect,
        element_timing_rect: &FrameRect,
        suppressed_by_transparent_ancestor: bool,
    ) {
        if !self.can_observe() {
            return;
        }
        if suppressed_by_transparent_ancestor {
            self.ignored.record_text(IgnoredText {
                id: container,
                first_size: root_rect.size.area() as usize,
                element_timing_rect: *element_timing_rect,
            });
            return;
        }
        self.texts.aggregate(container, root_rect, element_timing_rect);
    }

    /// Ends the current rendering frame: commits text aggregation, submits
    /// the open confirmation batch (if any) to the host compositor as one
    /// request, and advances the frame index.
    pub fn finish_frame(
        &mut self,
        compositor: &dyn HostCompositor,
    ) -> Option<PresentationRequestToken> {
        if self.frozen {
            return None;
        }
        self.texts.commit(self.current_frame, &mut self.scheduler);
        let token = self.scheduler.finish_frame(self.current_frame, compositor);
        self.current_frame = self.current_frame.next();
        token
    }

    /// Main-thread entry for a resolved presentation request. Each ledger
    /// drains its confirmation queue up to the resolved frame: every record
    /// queued in that frame or earlier receives the timestamp, in queue
    /// order, so a batch that resolves out of submission order still confirms
    /// earlier-frame records. The calculator then re-runs. A token the
    /// scheduler does not know is silently discarded.
    pub fn presentation_resolved(&mut self, token: PresentationRequestToken, paint_time: Instant) {
        let Some(resolved_frame) = self.scheduler.take_resolved(token) else {
            debug!("discarding presentation resolution for unknown batch {token:?}");
            return;
        };
        self.images.assign_queued_paint_times(resolved_frame, paint_time);
        self.texts.assign_queued_paint_times(resolved_frame, paint_time);
        if self.frozen {
            return;
        }
        self.calculator.maybe_report(
            self.images.largest(),
            self.texts.largest(),
            self.sink.as_mut(),
        );
    }

    /// Purges an element from every container, including the ignored-content
    /// tracker. Must be called synchronously when the element is detached;
    /// idempotent and safe for ids never tracked.
    pub fn remove(&mut self, id: LCPCandidateID) {
        self.images.remove(id);
        self.texts.remove(id);
        self.ignored.forget(id);
    }

    /// Promotes candidates that were held because of a fully transparent
    /// ancestor whose opacity just became non-zero. `is_still_attached`
    /// validates that the owning element still exists with renderable
    /// content.
    pub fn transparent_ancestor_became_visible(
        &mut self,
        is_still_attached: &dyn Fn(LCPCandidateID) -> bool,
    ) {
        if !self.can_observe() {
            return;
        }
        if let Some(image) = self.ignored.take_image() {
            if is_still_attached(image.id) {
                self.images.insert_promoted(
                    image.id,
                    image.first_size,
                    image.encoded_size,
                    self.current_frame,
                    &mut self.scheduler,
                );
            }
        }
        if let Some(text) = self.ignored.take_text() {
            if is_still_attached(text.id) {
                self.texts.insert_promoted(
                    text.id,
                    text.first_size,
                    text.element_timing_rect,
                    self.current_frame,
                    &mut self.scheduler,
                );
            }
        }
    }

    /// One-way `Active → Frozen` transition, triggered by the first user
    /// input or scroll. Idempotent. No candidates are accepted and no
    /// reports are emitted afterwards; the last reported pair remains
    /// readable.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.frozen = true;
        self.sink.report_frozen();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The last reported (paint time, size) pair.
    pub fn largest_contentful_paint(&self) -> Option<(Instant, usize)> {
        self.calculator.last_reported()
    }

    pub fn largest_image(&self) -> Option<LCPCandidate> {
        self.images.largest()
    }

    pub fn largest_text(&self) -> Option<LCPCandidate> {
        self.texts.largest()
    }

    pub fn seen_full_viewport_image(&self) -> bool {
        self.images.seen_full_viewport_image()
    }

    pub fn images(&self) -> &ImageRecordsManager {
        &self.images
    }

    pub fn texts(&self) -> &TextRecordsManager {
        &self.texts
    }

    pub fn scheduler(&self) -> &PresentationScheduler {
        &self.scheduler
    }

    fn can_observe(&self) -> bool {
        !self.frozen && self.sink.first_contentful_paint_recorded()
    }
}

/// Strong handle to a detector, held by the frame view that owns it.
#[derive(Clone)]
pub struct SharedPaintTimingDetector(Rc<RefCell<PaintTimingDetector>>);

impl SharedPaintTimingDetector {
    pub fn new(detector: PaintTimingDetector) -> Self {
        Self(Rc::new(RefCell::new(detector)))
    }

    pub fn borrow(&self) -> Ref<'_, PaintTimingDetector> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, PaintTimingDetector> {
        self.0.borrow_mut()
    }

    pub fn downgrade(&self) -> WeakPaintTimingDetector {
        WeakPaintTimingDetector(Rc::downgrade(&self.0))
    }
}

/// Weak handle given to the task that delivers compositor resolutions back
/// to the main thread. If the frame view was torn down first, delivery
/// degrades to a no-op instead of touching freed state.
#[derive(Clone)]
pub struct WeakPaintTimingDetector(Weak<RefCell<PaintTimingDetector>>);

impl WeakPaintTimingDetector {
    /// Returns whether the detector was still alive.
    pub fn presentation_resolved(
        &self,
        token: PresentationRequestToken,
        paint_time: Instant,
    ) -> bool {
        match self.0.upgrade() {
            Some(detector) => {
                detector.borrow_mut().presentation_resolved(token, paint_time);
                true
            },
            None => {
                debug!("dropping presentation resolution for destroyed frame view");
                false
            },
        }
    }
}
