pub mod correlation;
pub mod feature;

use std::sync::OnceLock;

use image::{GrayImage, Luma, RgbaImage};

use crate::config::Strategy;
use crate::error::Result;
use crate::logger;
use crate::templates::Template;
use crate::types::MatchResult;

pub use correlation::CorrelationMatcher;
pub use feature::FeatureMatcher;

/// One capture of the display, valid for a single tick.
pub struct Screenshot {
    /// Increases with every capture; matchers key per-tick caches on it.
    pub seq: u64,
    pub rgba: RgbaImage,
    pub gray: GrayImage,
    channels: OnceLock<[GrayImage; 3]>,
}

impl Screenshot {
    pub fn new(seq: u64, rgba: RgbaImage) -> Self {
        let gray = image::DynamicImage::ImageRgba8(rgba.clone()).to_luma8();
        Self { seq, rgba, gray, channels: OnceLock::new() }
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    /// R, G and B as separate planes, split on first use.
    pub fn channels(&self) -> &[GrayImage; 3] {
        self.channels.get_or_init(|| split_channels(&self.rgba))
    }
}

pub(crate) fn split_channels(img: &RgbaImage) -> [GrayImage; 3] {
    let (w, h) = img.dimensions();
    [0usize, 1, 2].map(|c| GrayImage::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y)[c]])))
}

/// Locates a template inside a screenshot.
///
/// `Ok(None)` is the normal "not on screen" answer. `Err` means the matching
/// itself failed for this template; the loop skips the template for the
/// current tick unless the error is fatal.
pub trait Matcher {
    fn name(&self) -> &'static str;

    fn find(
        &self,
        template: &Template,
        screenshot: &Screenshot,
        grayscale: bool,
        confidence: f32,
    ) -> Result<Option<MatchResult>>;
}

/// Create the matcher for the configured strategy.
pub fn create_matcher(strategy: Strategy) -> Box<dyn Matcher> {
    logger::register_prefix("matcher", logger::COLOR_BLUE);
    let matcher: Box<dyn Matcher> = match strategy {
        Strategy::Correlation => Box::new(CorrelationMatcher::new()),
        Strategy::Feature => Box::new(FeatureMatcher::new()),
    };
    logger::info_p("matcher", &format!("using {} matching", matcher.name()));
    matcher
}
