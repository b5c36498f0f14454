use std::cell::RefCell;
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::rc::Rc;

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::binary_descriptors::brief::{brief, BriefDescriptor, TestPair};
use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::corners::oriented_fast;
use imageproc::point::Point as PixelPoint;

use super::{Matcher, Screenshot};
use crate::error::{BotError, Result};
use crate::logger;
use crate::templates::Template;
use crate::types::{MatchResult, Point};

/// Lowe's ratio: best distance must be below this share of the runner-up.
pub const RATIO: f32 = 0.5;
pub const DESCRIPTOR_BITS: usize = 256;
/// Matched keypoints must agree on orientation (radians); screen elements are
/// not rotated.
pub const MAX_ORIENTATION_DIFF: f32 = 0.5;

/// BRIEF samples a 31x31 patch and needs one more pixel of margin.
const EDGE_RADIUS: u32 = 16;
const FAST_THRESHOLD: u8 = 20;
const MAX_SCREEN_FEATURES: usize = 5000;
const MAX_TEMPLATE_FEATURES: usize = 500;
const TEMPLATE_SCALES: [f32; 5] = [0.5, 0.71, 1.0, 1.41, 2.0];

/// Oriented FAST keypoint with its BRIEF descriptor.
#[derive(Clone)]
pub struct Feature {
    pub descriptor: BriefDescriptor,
    pub orientation: f32,
}

impl Feature {
    pub fn position(&self) -> (u32, u32) {
        (self.descriptor.corner.x, self.descriptor.corner.y)
    }
}

/// Keypoint matching: oriented FAST corners, BRIEF descriptors, the template
/// described at several scales, ratio-tested nearest neighbours. Answers with
/// the median of the matched screen keypoints.
pub struct FeatureMatcher {
    /// Generated by the first `brief` call, then shared by every descriptor.
    test_pairs: RefCell<Option<Vec<TestPair>>>,
    templates: RefCell<HashMap<String, Rc<Vec<Feature>>>>,
    screen: RefCell<Option<(u64, Rc<Vec<Feature>>)>>,
}

impl Default for FeatureMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureMatcher {
    pub fn new() -> Self {
        Self {
            test_pairs: RefCell::new(None),
            templates: RefCell::new(HashMap::new()),
            screen: RefCell::new(None),
        }
    }

    /// Features of `gray`, strongest corners first.
    pub fn extract(&self, gray: &GrayImage, limit: usize) -> Result<Vec<Feature>> {
        let (w, h) = gray.dimensions();
        if w <= 2 * EDGE_RADIUS + 1 || h <= 2 * EDGE_RADIUS + 1 {
            return Ok(Vec::new());
        }
        let corners = oriented_fast(gray, Some(FAST_THRESHOLD), limit, EDGE_RADIUS, None);
        if corners.is_empty() {
            return Ok(Vec::new());
        }
        let keypoints: Vec<PixelPoint<u32>> = corners
            .iter()
            .map(|c| PixelPoint::new(c.corner.x, c.corner.y))
            .collect();

        let (descriptors, used) = {
            let pairs = self.test_pairs.borrow();
            brief(gray, &keypoints, DESCRIPTOR_BITS, pairs.as_ref()).map_err(BotError::Match)?
        };
        let mut pairs = self.test_pairs.borrow_mut();
        if pairs.is_none() {
            *pairs = Some(used);
        }

        Ok(descriptors
            .into_iter()
            .zip(&corners)
            .map(|(descriptor, c)| Feature { descriptor, orientation: c.orientation })
            .collect())
    }

    fn template_features(&self, template: &Template) -> Result<Rc<Vec<Feature>>> {
        if let Some(cached) = self.templates.borrow().get(&template.name) {
            return Ok(Rc::clone(cached));
        }
        let (w, h) = template.gray.dimensions();
        let mut features = Vec::new();
        for scale in TEMPLATE_SCALES {
            let sw = (w as f32 * scale).round() as u32;
            let sh = (h as f32 * scale).round() as u32;
            if sw == 0 || sh == 0 {
                continue;
            }
            let scaled = if sw == w && sh == h {
                template.gray.clone()
            } else {
                imageops::resize(&template.gray, sw, sh, FilterType::Triangle)
            };
            features.extend(self.extract(&scaled, MAX_TEMPLATE_FEATURES)?);
        }
        logger::debug_p(
            "matcher",
            &format!("template {}: {} feature(s) over {} scales", template.name, features.len(), TEMPLATE_SCALES.len()),
        );
        let features = Rc::new(features);
        self.templates
            .borrow_mut()
            .insert(template.name.clone(), Rc::clone(&features));
        Ok(features)
    }

    fn screen_features(&self, screenshot: &Screenshot) -> Result<Rc<Vec<Feature>>> {
        if let Some((seq, cached)) = self.screen.borrow().as_ref() {
            if *seq == screenshot.seq {
                return Ok(Rc::clone(cached));
            }
        }
        let features = Rc::new(self.extract(&screenshot.gray, MAX_SCREEN_FEATURES)?);
        *self.screen.borrow_mut() = Some((screenshot.seq, Rc::clone(&features)));
        Ok(features)
    }
}

impl Matcher for FeatureMatcher {
    fn name(&self) -> &'static str {
        "feature"
    }

    fn find(
        &self,
        template: &Template,
        screenshot: &Screenshot,
        _grayscale: bool,
        confidence: f32,
    ) -> Result<Option<MatchResult>> {
        let template_features = self.template_features(template)?;
        if template_features.is_empty() {
            return Ok(None);
        }
        let screen_features = self.screen_features(screenshot)?;
        let max_distance = ((1.0 - confidence.clamp(0.0, 1.0)) * DESCRIPTOR_BITS as f32).round() as u32;

        let kept = ratio_matches(&template_features, &screen_features, max_distance);
        Ok(median_point(&kept).map(|point| MatchResult::Point { point, pairs: kept.len() }))
    }
}

fn angle_between(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

/// Screen features whose template partner passes the ratio test, the
/// absolute distance cap and the orientation check. Needs at least two
/// candidates to compare.
pub fn ratio_matches<'a>(template: &[Feature], screen: &'a [Feature], max_distance: u32) -> Vec<&'a Feature> {
    if screen.len() < 2 {
        return Vec::new();
    }
    let mut kept = Vec::new();
    for t in template {
        let mut best = (u32::MAX, 0usize);
        let mut second = u32::MAX;
        for (i, s) in screen.iter().enumerate() {
            let d = t.descriptor.hamming_distance(&s.descriptor);
            if d < best.0 {
                second = best.0;
                best = (d, i);
            } else if d < second {
                second = d;
            }
        }
        let candidate = &screen[best.1];
        if (best.0 as f32) < RATIO * second as f32
            && best.0 <= max_distance
            && angle_between(t.orientation, candidate.orientation) <= MAX_ORIENTATION_DIFF
        {
            kept.push(candidate);
        }
    }
    kept
}

/// Coordinate-wise median, rounded to whole pixels.
pub fn median_point(features: &[&Feature]) -> Option<Point> {
    if features.is_empty() {
        return None;
    }
    let mut xs: Vec<f32> = features.iter().map(|f| f.position().0 as f32).collect();
    let mut ys: Vec<f32> = features.iter().map(|f| f.position().1 as f32).collect();
    Some(Point::new(median(&mut xs).round() as i32, median(&mut ys).round() as i32))
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use imageproc::corners::Corner;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::PI;

    fn feature(x: u32, y: u32, bits: u128) -> Feature {
        Feature {
            descriptor: BriefDescriptor { bits: vec![bits, 0], corner: Corner::new(x, y, 0.0) },
            orientation: 0.0,
        }
    }

    fn noise(w: u32, h: u32, seed: u64) -> RgbaImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbaImage::from_fn(w, h, |_, _| {
            let v: u8 = rng.gen();
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_ratio_test_keeps_distinct_match() {
        let template = [feature(0, 0, 0xff)];
        let screen = [
            feature(10, 10, 0xff),             // distance 0
            feature(20, 20, 0xffff_ff00_0000), // distance 32
        ];
        let kept = ratio_matches(&template, &screen, 64);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].position(), (10, 10));
    }

    #[test]
    fn test_ratio_test_rejects_ambiguous_match() {
        let template = [feature(0, 0, 0xff)];
        let screen = [
            feature(10, 10, 0x0f), // distance 4
            feature(20, 20, 0x3f), // distance 2
        ];
        assert!(ratio_matches(&template, &screen, 64).is_empty());
    }

    #[test]
    fn test_distance_cap() {
        let template = [feature(0, 0, 0)];
        let screen = [
            feature(10, 10, 0xffff),          // distance 16
            feature(20, 20, u64::MAX as u128), // distance 64
        ];
        assert_eq!(ratio_matches(&template, &screen, 16).len(), 1);
        assert!(ratio_matches(&template, &screen, 15).is_empty());
    }

    #[test]
    fn test_orientation_must_agree() {
        let template = [feature(0, 0, 0xff)];
        let mut flipped = feature(10, 10, 0xff);
        flipped.orientation = PI;
        let screen = [flipped, feature(20, 20, 0xffff_ff00_0000)];
        assert!(ratio_matches(&template, &screen, 64).is_empty());

        let mut near = feature(10, 10, 0xff);
        near.orientation = TAU - 0.1;
        let screen = [near, feature(20, 20, 0xffff_ff00_0000)];
        assert_eq!(ratio_matches(&template, &screen, 64).len(), 1);
    }

    #[test]
    fn test_single_candidate_is_ambiguous() {
        let template = [feature(0, 0, 0)];
        let screen = [feature(1, 1, 0)];
        assert!(ratio_matches(&template, &screen, 64).is_empty());
    }

    #[test]
    fn test_median_point() {
        let a = feature(1, 10, 0);
        let b = feature(5, 2, 0);
        let c = feature(100, 4, 0);
        assert_eq!(median_point(&[&a, &b, &c]), Some(Point::new(5, 4)));
        assert_eq!(median_point(&[&a, &b]), Some(Point::new(3, 6)));
        assert_eq!(median_point(&[]), None);
    }

    #[test]
    fn test_blank_screenshot_has_no_match() {
        let matcher = FeatureMatcher::new();
        let shot = Screenshot::new(1, RgbaImage::from_pixel(200, 200, Rgba([90, 90, 90, 255])));
        let tpl = Template::new("noise", noise(64, 64, 3));
        assert_eq!(matcher.find(&tpl, &shot, true, 0.7).unwrap(), None);
    }

    #[test]
    fn test_tiny_template_has_no_features() {
        let matcher = FeatureMatcher::new();
        let shot = Screenshot::new(1, noise(100, 100, 1));
        let tpl = Template::new("tiny", noise(8, 8, 2));
        assert_eq!(matcher.find(&tpl, &shot, true, 0.7).unwrap(), None);
    }

    #[test]
    fn test_screen_features_cached_per_screenshot() {
        let matcher = FeatureMatcher::new();
        let shot = Screenshot::new(7, noise(120, 120, 4));
        let first = matcher.screen_features(&shot).unwrap();
        let again = matcher.screen_features(&shot).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert!(!first.is_empty());
        let next = matcher.screen_features(&Screenshot::new(8, noise(120, 120, 4))).unwrap();
        assert!(!Rc::ptr_eq(&first, &next));
    }

    #[test]
    fn test_finds_pasted_patch() {
        let tpl = noise(96, 96, 2);
        let mut screen = noise(320, 240, 1);
        imageops::replace(&mut screen, &tpl, 150, 80);
        let matcher = FeatureMatcher::new();
        let found = matcher
            .find(&Template::new("patch", tpl), &Screenshot::new(1, screen), true, 0.7)
            .unwrap();
        match found {
            Some(MatchResult::Point { point, pairs }) => {
                assert!(pairs > 0);
                assert!((150..246).contains(&point.x), "{:?}", point);
                assert!((80..176).contains(&point.y), "{:?}", point);
            }
            other => panic!("expected a point, got {:?}", other),
        }
    }
}
