/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The largest-contentful-paint (LCP) detection engine.
//!
//! One [`PaintTimingDetector`] is created per frame view. The paint walk
//! reports every painted image and text block into it, the host compositor
//! resolves per-frame presentation timestamps back into it, and the detector
//! emits a stream of monotonically growing "largest candidate" reports to an
//! [`ObservabilitySink`].
//!
//! The pipeline inside the detector:
//!
//! ```text
//! paint walk ──▶ ImageRecordsManager ─┐
//!           └──▶ TextRecordsManager  ─┼──▶ LargestContentfulPaintCalculator ──▶ sink
//! compositor ──▶ PresentationScheduler┘
//! ```
//!
//! All candidate state lives on the frame view's main thread; the only
//! cross-thread interaction is the compositor resolving a presentation
//! request, which must be delivered back through a
//! [`WeakPaintTimingDetector`] so that a torn-down frame view degrades the
//! delivery to a no-op.

mod calculator;
mod candidate;
mod detector;
mod ignored;
mod image;
mod presentation;
mod text;

pub use calculator::{LargestContentfulPaintCalculator, ObservabilitySink};
pub use candidate::{
    ContentfulPaintType, FrameIndex, ImagePaintInfo, ImageRecord, LCPCandidate, LCPCandidateID,
    LargestContentfulPaint, TextRecord,
};
pub use detector::{PaintTimingDetector, SharedPaintTimingDetector, WeakPaintTimingDetector};
pub use ignored::IgnoredContentTracker;
pub use image::ImageRecordsManager;
pub use presentation::{
    HostCompositor, PresentationRequestToken, PresentationScheduler,
};
pub use text::TextRecordsManager;

/// Images whose encoded data carries fewer bits per displayed pixel than
/// this are treated as low-content textures and never become candidates.
pub const MINIMUM_IMAGE_ENTROPY: f64 = 0.05;

/// Tuning knobs for the engine, passed at detector construction.
#[derive(Clone, Copy, Debug)]
pub struct PaintTimingConfig {
    /// Whether the bits-per-pixel entropy filter is applied to images.
    pub exclude_low_entropy_images: bool,
    /// Minimum bits per displayed pixel for an image to be a candidate.
    pub minimum_image_bpp: f64,
}

impl Default for PaintTimingConfig {
    fn default() -> Self {
        Self {
            exclude_low_entropy_images: true,
            minimum_image_bpp: MINIMUM_IMAGE_ENTROPY,
        }
    }
}

/// Unit of rectangles in the coordinate space of the containing frame view.
#[derive(Clone, Copy, Debug)]
pub struct FramePixel;

/// Unit of rectangles in the coordinate space of the root frame, after the
/// caller has clipped them to every containing viewport.
#[derive(Clone, Copy, Debug)]
pub struct RootPixel;

pub type FrameRect = euclid::Rect<f32, FramePixel>;
pub type RootRect = euclid::Rect<f32, RootPixel>;
pub type RootSize = euclid::Size2D<f32, RootPixel>;
