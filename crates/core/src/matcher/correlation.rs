use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use super::{split_channels, Matcher, Screenshot};
use crate::error::{BotError, Result};
use crate::templates::Template;
use crate::types::{MatchResult, Rect};

/// Smallest template side kept after downsampling for the coarse pass.
const MIN_COARSE_SIDE: u32 = 12;
const MAX_FACTOR: u32 = 4;
/// Coarse candidates refined at full resolution.
const COARSE_PEAKS: usize = 8;

/// Correlation score for every window position.
type ScoreMap = Image<Luma<f32>>;

/// Sliding-window zero-mean normalized correlation (the score OpenCV calls
/// `TM_CCOEFF_NORMED`), searched coarse-to-fine.
#[derive(Debug, Default)]
pub struct CorrelationMatcher;

impl CorrelationMatcher {
    pub fn new() -> Self {
        CorrelationMatcher
    }
}

impl Matcher for CorrelationMatcher {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn find(
        &self,
        template: &Template,
        screenshot: &Screenshot,
        grayscale: bool,
        confidence: f32,
    ) -> Result<Option<MatchResult>> {
        let (tw, th) = template.gray.dimensions();
        let (sw, sh) = (screenshot.width(), screenshot.height());
        if tw == 0 || th == 0 {
            return Err(BotError::Match(format!("template {} is empty", template.name)));
        }
        if tw > sw || th > sh {
            return Err(BotError::Match(format!(
                "template {} ({}x{}) is larger than the screenshot ({}x{})",
                template.name, tw, th, sw, sh
            )));
        }

        let split;
        let needles: Vec<&GrayImage> = if grayscale {
            vec![&template.gray]
        } else {
            split = split_channels(&template.rgba);
            split.iter().collect()
        };
        let haystacks: Vec<&GrayImage> = if grayscale {
            vec![&screenshot.gray]
        } else {
            screenshot.channels().iter().collect()
        };

        // Flat planes have no defined correlation; score on the others.
        let planes: Vec<(&GrayImage, &GrayImage)> = haystacks
            .into_iter()
            .zip(needles)
            .filter(|(_, needle)| !is_flat(needle))
            .collect();
        if planes.is_empty() {
            return Err(BotError::Match(format!("template {} has no contrast", template.name)));
        }

        let Some((x, y, score)) = search(&planes, tw, th, sw, sh, confidence) else {
            return Ok(None);
        };
        if score < confidence {
            return Ok(None);
        }
        Ok(Some(MatchResult::Region {
            rect: Rect::new(x as i32, y as i32, tw as i32, th as i32),
            score,
        }))
    }
}

/// Best window position. Coarse peaks are refined first; when none of them
/// clears `confidence` the full-resolution map decides, so a target out of
/// phase with the downsampling grid is never lost to blurred look-alikes.
fn search(
    planes: &[(&GrayImage, &GrayImage)],
    tw: u32,
    th: u32,
    sw: u32,
    sh: u32,
    confidence: f32,
) -> Option<(u32, u32, f32)> {
    let factor = (tw.min(th) / MIN_COARSE_SIDE).clamp(1, MAX_FACTOR);
    if factor < 2 {
        return best(&score_planes(planes));
    }

    let coarse: Vec<(GrayImage, GrayImage)> = planes
        .iter()
        .map(|(hay, needle)| {
            (
                imageops::resize(*hay, sw / factor, sh / factor, FilterType::Triangle),
                imageops::resize(*needle, tw / factor, th / factor, FilterType::Triangle),
            )
        })
        .collect();
    let coarse_refs: Vec<(&GrayImage, &GrayImage)> = coarse.iter().map(|(h, n)| (h, n)).collect();
    let coarse_map = score_planes(&coarse_refs);
    let min_dist = ((tw / factor).min(th / factor) / 2).max(1);

    let refined = peaks(&coarse_map, COARSE_PEAKS, min_dist)
        .into_iter()
        .filter_map(|(cx, cy)| refine(planes, cx * factor, cy * factor, factor, tw, th, sw, sh))
        .max_by(|a, b| a.2.total_cmp(&b.2));
    match refined {
        Some(hit) if hit.2 >= confidence => Some(hit),
        _ => best(&score_planes(planes)),
    }
}

/// Full-resolution search in a small window around a coarse hit.
#[allow(clippy::too_many_arguments)]
fn refine(
    planes: &[(&GrayImage, &GrayImage)],
    x: u32,
    y: u32,
    margin: u32,
    tw: u32,
    th: u32,
    sw: u32,
    sh: u32,
) -> Option<(u32, u32, f32)> {
    let x0 = x.saturating_sub(margin).min(sw - tw);
    let y0 = y.saturating_sub(margin).min(sh - th);
    let x1 = (x + margin).min(sw - tw);
    let y1 = (y + margin).min(sh - th);
    let (w, h) = (x1 - x0 + tw, y1 - y0 + th);

    let crops: Vec<(GrayImage, &GrayImage)> = planes
        .iter()
        .map(|(hay, needle)| (imageops::crop_imm(*hay, x0, y0, w, h).to_image(), *needle))
        .collect();
    let crop_refs: Vec<(&GrayImage, &GrayImage)> = crops.iter().map(|(h, n)| (h, *n)).collect();
    let (bx, by, score) = best(&score_planes(&crop_refs))?;
    Some((x0 + bx, y0 + by, score))
}

fn is_flat(img: &GrayImage) -> bool {
    let mut pixels = img.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

fn best(map: &ScoreMap) -> Option<(u32, u32, f32)> {
    if map.width() == 0 || map.height() == 0 {
        return None;
    }
    let extremes = find_extremes(map);
    let (x, y) = extremes.max_value_location;
    Some((x, y, extremes.max_value))
}

/// Up to `k` best positions at least `min_dist` apart (Chebyshev).
fn peaks(map: &ScoreMap, k: usize, min_dist: u32) -> Vec<(u32, u32)> {
    let mut cells: Vec<(f32, u32, u32)> = map
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0].is_finite())
        .map(|(x, y, p)| (p[0], x, y))
        .collect();
    cells.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut picked: Vec<(u32, u32)> = Vec::with_capacity(k);
    for (_, x, y) in cells {
        if picked.len() == k {
            break;
        }
        let far = picked
            .iter()
            .all(|&(px, py)| px.abs_diff(x).max(py.abs_diff(y)) >= min_dist);
        if far {
            picked.push((x, y));
        }
    }
    picked
}

/// Score maps of all planes, averaged.
fn score_planes(planes: &[(&GrayImage, &GrayImage)]) -> ScoreMap {
    let mut maps = planes.iter().map(|(hay, needle)| ncc_map(hay, needle));
    let Some(mut acc) = maps.next() else {
        return ScoreMap::new(0, 0);
    };
    let mut count = 1.0;
    for map in maps {
        for (a, b) in acc.iter_mut().zip(map.iter()) {
            *a += *b;
        }
        count += 1.0;
    }
    for a in acc.iter_mut() {
        *a /= count;
    }
    acc
}

/// Zero-mean normalized correlation: imageproc supplies the raw cross term,
/// window sums come from integral images. Sums are u64 since squared sums
/// over a full-screen window overflow u32.
fn ncc_map(hay: &GrayImage, needle: &GrayImage) -> ScoreMap {
    let (hw, hh) = hay.dimensions();
    let (tw, th) = needle.dimensions();
    let n = (tw * th) as f64;

    let cross = match_template(hay, needle, MatchTemplateMethod::CrossCorrelation);
    let sums = integral_image::<_, u64>(hay);
    let squares = integral_squared_image::<_, u64>(hay);

    let t_sum: f64 = needle.pixels().map(|p| p[0] as f64).sum();
    let t_sq: f64 = needle.pixels().map(|p| (p[0] as f64).powi(2)).sum();
    let t_var = t_sq - t_sum * t_sum / n;

    ScoreMap::from_fn(hw - tw + 1, hh - th + 1, |x, y| {
        let (right, bottom) = (x + tw - 1, y + th - 1);
        let s = sum_image_pixels(&sums, x, y, right, bottom)[0] as f64;
        let s2 = sum_image_pixels(&squares, x, y, right, bottom)[0] as f64;
        let i_var = s2 - s * s / n;
        let num = cross.get_pixel(x, y)[0] as f64 - s * t_sum / n;
        let den = (i_var * t_var).sqrt();
        Luma([if den > 1e-6 { (num / den) as f32 } else { 0.0 }])
    })
}
