/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end tests for the detector facade: frame batching, reporting,
//! freezing, ignored-content promotion, and teardown safety.

use std::time::{Duration, Instant};

use paint_timing::{
    ContentfulPaintType, LCPCandidateID, PaintTimingDetector, SharedPaintTimingDetector,
};

use crate::helpers::{
    TestCompositor, TestSink, detector_with, frame_rect, id, intrinsic, loaded_image, root_rect,
};

fn observe_square(detector: &mut PaintTimingDetector, candidate: usize, side: f32) -> bool {
    detector.observe_image(
        id(candidate),
        &frame_rect(0.0, 0.0, side, side),
        &root_rect(0.0, 0.0, side, side),
        &intrinsic(side, side),
        &loaded_image(4096),
        false,
    )
}

fn observe_square_suppressed(detector: &mut PaintTimingDetector, candidate: usize, side: f32) {
    detector.observe_image(
        id(candidate),
        &frame_rect(0.0, 0.0, side, side),
        &root_rect(0.0, 0.0, side, side),
        &intrinsic(side, side),
        &loaded_image(4096),
        true,
    );
}

/// Finishes the current frame and immediately resolves its batch.
fn resolve_frame(detector: &mut PaintTimingDetector, compositor: &TestCompositor, time: Instant) {
    let token = detector
        .finish_frame(compositor)
        .expect("a confirmation batch should have been submitted");
    detector.presentation_resolved(token, time);
}

#[test]
fn reported_largest_grows_and_is_never_retracted() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(16);

    assert!(observe_square(&mut detector, 1, 5.0));
    resolve_frame(&mut detector, &compositor, t0);
    {
        let state = sink.0.borrow();
        assert_eq!(state.reports.len(), 1);
        assert_eq!(state.reports[0].area, 25);
        assert_eq!(state.reports[0].candidate_index, 1);
    }
    assert_eq!(detector.largest_contentful_paint(), Some((t0, 25)));

    assert!(observe_square(&mut detector, 2, 9.0));
    resolve_frame(&mut detector, &compositor, t1);
    {
        let state = sink.0.borrow();
        assert_eq!(state.reports.len(), 2);
        assert_eq!(state.reports[1].area, 81);
        assert_eq!(state.reports[1].candidate_index, 2);
    }

    // Removing the reported largest rolls the ledger back to the next-best
    // candidate, but already-emitted maxima stay.
    detector.remove(id(2));
    assert_eq!(detector.largest_image().unwrap().id, id(1));
    assert_eq!(detector.largest_image().unwrap().area, 25);
    assert_eq!(detector.largest_contentful_paint(), Some((t1, 81)));
    assert_eq!(sink.0.borrow().reports.len(), 2);
}

#[test]
fn equal_size_images_report_the_earlier_insertion() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);

    assert!(observe_square(&mut detector, 1, 5.0));
    assert!(observe_square(&mut detector, 2, 5.0));
    resolve_frame(&mut detector, &compositor, Instant::now());

    let state = sink.0.borrow();
    assert_eq!(state.reports.len(), 1);
    assert_eq!(state.reports[0].id, id(1));
    assert_eq!(detector.largest_image().unwrap().id, id(1));
}

#[test]
fn image_and_text_candidates_merge_into_one_signal() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(16);

    detector.aggregate_text(
        id(10),
        &root_rect(0.0, 0.0, 10.0, 10.0),
        &frame_rect(0.0, 0.0, 10.0, 10.0),
        false,
    );
    assert!(observe_square(&mut detector, 1, 5.0));
    resolve_frame(&mut detector, &compositor, t0);
    {
        let state = sink.0.borrow();
        assert_eq!(state.reports.len(), 1);
        assert_eq!(state.reports[0].lcp_type, ContentfulPaintType::Text);
        assert_eq!(state.reports[0].area, 100);
        assert!(state.reports[0].entropy.is_none());
    }

    assert!(observe_square(&mut detector, 2, 20.0));
    resolve_frame(&mut detector, &compositor, t1);
    let state = sink.0.borrow();
    assert_eq!(state.reports.len(), 2);
    assert_eq!(state.reports[1].lcp_type, ContentfulPaintType::Image);
    assert_eq!(state.reports[1].area, 400);
    assert!(state.reports[1].entropy.is_some());
}

#[test]
fn image_beats_text_of_equal_size() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);

    detector.aggregate_text(
        id(10),
        &root_rect(0.0, 0.0, 10.0, 10.0),
        &frame_rect(0.0, 0.0, 10.0, 10.0),
        false,
    );
    assert!(observe_square(&mut detector, 1, 10.0));
    resolve_frame(&mut detector, &compositor, Instant::now());

    let state = sink.0.borrow();
    assert_eq!(state.reports.len(), 1);
    assert_eq!(state.reports[0].lcp_type, ContentfulPaintType::Image);
    assert_eq!(state.reports[0].id, id(1));
}

#[test]
fn nothing_is_reported_before_presentation_resolves() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);

    assert!(observe_square(&mut detector, 1, 5.0));
    assert!(detector.largest_contentful_paint().is_none());

    let token = detector.finish_frame(&compositor).unwrap();
    assert!(sink.0.borrow().reports.is_empty());
    assert_eq!(compositor.0.borrow().len(), 1);

    detector.presentation_resolved(token, Instant::now());
    assert_eq!(sink.0.borrow().reports.len(), 1);
}

#[test]
fn out_of_order_resolution_confirms_earlier_queued_records() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(16);

    assert!(observe_square(&mut detector, 1, 9.0));
    let first_batch = detector.finish_frame(&compositor).unwrap();
    assert!(observe_square(&mut detector, 2, 5.0));
    let second_batch = detector.finish_frame(&compositor).unwrap();

    // The later frame resolves first. Its timestamp also confirms the record
    // queued in the earlier frame: by the time frame 1 was presented, frame
    // 0's pixels were on screen too.
    detector.presentation_resolved(second_batch, t1);
    assert_eq!(
        detector.images().record(id(1)).unwrap().paint_time(),
        Some(t1)
    );
    {
        let state = sink.0.borrow();
        assert_eq!(state.reports.len(), 1);
        assert_eq!(state.reports[0].id, id(1));
        assert_eq!(state.reports[0].area, 81);
        assert_eq!(state.reports[0].paint_time, t1);
    }

    // The earlier batch's own resolution arrives afterwards; assigned paint
    // times are immutable and nothing new is reported.
    detector.presentation_resolved(first_batch, t0);
    assert_eq!(
        detector.images().record(id(1)).unwrap().paint_time(),
        Some(t1)
    );
    assert_eq!(sink.0.borrow().reports.len(), 1);
    assert_eq!(detector.largest_contentful_paint(), Some((t1, 81)));
}

#[test]
fn duplicate_resolution_is_a_no_op() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);
    let t0 = Instant::now();

    assert!(observe_square(&mut detector, 1, 5.0));
    let token = detector.finish_frame(&compositor).unwrap();
    detector.presentation_resolved(token, t0);
    assert_eq!(sink.0.borrow().reports.len(), 1);

    detector.presentation_resolved(token, t0 + Duration::from_millis(16));
    assert_eq!(sink.0.borrow().reports.len(), 1);
    assert_eq!(detector.largest_contentful_paint(), Some((t0, 25)));
}

#[test]
fn freeze_is_idempotent_and_terminal() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);
    let t0 = Instant::now();

    assert!(observe_square(&mut detector, 1, 5.0));
    resolve_frame(&mut detector, &compositor, t0);

    // A batch in flight across the freeze still gets its paint times, but
    // produces no report.
    assert!(observe_square(&mut detector, 2, 9.0));
    let in_flight = detector.finish_frame(&compositor).unwrap();

    detector.freeze();
    detector.freeze();
    assert!(detector.is_frozen());
    assert_eq!(sink.0.borrow().frozen_notifications, 1);

    assert!(!observe_square(&mut detector, 3, 20.0));
    assert!(detector.finish_frame(&compositor).is_none());
    detector.presentation_resolved(in_flight, t0 + Duration::from_millis(16));

    assert_eq!(sink.0.borrow().reports.len(), 1);
    assert_eq!(detector.largest_contentful_paint(), Some((t0, 25)));
}

#[test]
fn observation_waits_for_first_contentful_paint() {
    let sink = TestSink::new(1000.0, 1000.0);
    let mut detector = detector_with(&sink);
    sink.0.borrow_mut().fcp_recorded = false;

    assert!(!observe_square(&mut detector, 1, 5.0));
    assert_eq!(detector.images().tracked_candidate_count(), 0);

    sink.0.borrow_mut().fcp_recorded = true;
    assert!(observe_square(&mut detector, 1, 5.0));
}

#[test]
fn invalid_ids_are_ignored() {
    let sink = TestSink::new(1000.0, 1000.0);
    let mut detector = detector_with(&sink);
    assert!(!observe_square(&mut detector, 0, 5.0));
    detector.remove(LCPCandidateID::INVALID);
    assert_eq!(detector.images().tracked_candidate_count(), 0);
}

#[test]
fn resolution_after_frame_view_teardown_is_safe() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let shared = SharedPaintTimingDetector::new(detector_with(&sink));

    let token = {
        let mut detector = shared.borrow_mut();
        assert!(observe_square(&mut detector, 1, 5.0));
        detector.finish_frame(&compositor).unwrap()
    };
    let weak = shared.downgrade();
    drop(shared);

    assert!(!weak.presentation_resolved(token, Instant::now()));
    assert!(sink.0.borrow().reports.is_empty());
}

#[test]
fn ignored_content_is_held_and_promoted() {
    let sink = TestSink::new(1000.0, 1000.0);
    let compositor = TestCompositor::default();
    let mut detector = detector_with(&sink);

    observe_square_suppressed(&mut detector, 1, 9.0);
    observe_square_suppressed(&mut detector, 2, 5.0);
    assert!(detector.largest_image().is_none());
    assert_eq!(detector.images().tracked_candidate_count(), 0);

    // The suppressing ancestor becomes visible: only the largest held
    // candidate is promoted, with its original size.
    detector.transparent_ancestor_became_visible(&|candidate| candidate == id(1));
    assert_eq!(detector.images().tracked_candidate_count(), 1);
    resolve_frame(&mut detector, &compositor, Instant::now());

    let state = sink.0.borrow();
    assert_eq!(state.reports.len(), 1);
    assert_eq!(state.reports[0].id, id(1));
    assert_eq!(state.reports[0].area, 81);
}

#[test]
fn ignored_content_of_a_detached_element_is_dropped() {
    let sink = TestSink::new(1000.0, 1000.0);
    let mut detector = detector_with(&sink);

    observe_square_suppressed(&mut detector, 1, 9.0);
    detector.transparent_ancestor_became_visible(&|_| false);
    assert_eq!(detector.images().tracked_candidate_count(), 0);
    assert!(detector.largest_image().is_none());

    // remove() also forgets held candidates.
    observe_square_suppressed(&mut detector, 2, 9.0);
    detector.remove(id(2));
    detector.transparent_ancestor_became_visible(&|_| true);
    assert_eq!(detector.images().tracked_candidate_count(), 0);
}

#[test]
fn full_viewport_image_sets_the_diagnostic_latch() {
    let sink = TestSink::new(100.0, 100.0);
    let mut detector = detector_with(&sink);

    assert!(!observe_square(&mut detector, 1, 100.0));
    assert!(detector.seen_full_viewport_image());
    assert!(detector.largest_image().is_none());
}
