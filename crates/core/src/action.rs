use rand::Rng;

use crate::config::LoopConfig;
use crate::types::{MatchResult, Point, PointerAction};

/// Turns per-tick match outcomes into pointer actions.
///
/// Holds the two counters behind the scroll policies: the miss countdown
/// (scroll after `retries_before_scroll` consecutive misses) and the overlay
/// streak (scroll after the same template matched `overlay_streak` ticks in a
/// row, which points at a static see-through element that never goes away).
#[derive(Debug, Clone)]
pub struct ActionSelector {
    tolerance: i32,
    retries_before_scroll: u32,
    overlay_enabled: bool,
    overlay_streak: u32,
    scroll_amount: i32,

    retries_left: u32,
    streak: u32,
    last_match: Option<String>,
}

impl ActionSelector {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            tolerance: config.tol_pixels.min(i32::MAX as u32) as i32,
            retries_before_scroll: config.retries_before_scroll,
            overlay_enabled: config.transparent_ads_fix,
            overlay_streak: config.overlay_streak.max(1),
            scroll_amount: config.scroll_amount,
            retries_left: config.retries_before_scroll,
            streak: 0,
            last_match: None,
        }
    }

    /// Click target for a match: rectangle center or feature point, with
    /// the y coordinate jittered by up to `tolerance` pixels either way.
    pub fn click_point<R: Rng + ?Sized>(&self, found: &MatchResult, rng: &mut R) -> Point {
        let target = found.target();
        let dy = rng.gen_range(-self.tolerance..=self.tolerance);
        Point::new(target.x, target.y.saturating_add(dy))
    }

    /// Actions for a tick where `template` matched.
    pub fn on_match<R: Rng + ?Sized>(&mut self, template: &str, found: &MatchResult, rng: &mut R) -> Vec<PointerAction> {
        self.retries_left = self.retries_before_scroll;
        if self.last_match.as_deref() == Some(template) {
            self.streak += 1;
        } else {
            self.streak = 1;
            self.last_match = Some(template.to_string());
        }

        let mut actions = vec![PointerAction::Click(self.click_point(found, rng))];
        if self.overlay_enabled && self.streak >= self.overlay_streak {
            self.streak = 0;
            actions.push(PointerAction::Scroll(self.scroll_amount));
        }
        actions
    }

    /// Action for a tick where nothing matched, if the countdown ran out.
    pub fn on_miss(&mut self) -> Option<PointerAction> {
        self.streak = 0;
        self.last_match = None;
        if self.retries_before_scroll == 0 {
            return None;
        }
        self.retries_left = self.retries_left.saturating_sub(1);
        if self.retries_left == 0 {
            self.retries_left = self.retries_before_scroll;
            return Some(PointerAction::Scroll(self.scroll_amount));
        }
        None
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn region() -> MatchResult {
        MatchResult::Region { rect: Rect::new(100, 200, 40, 20), score: 0.9 }
    }

    fn selector(config: LoopConfig) -> (ActionSelector, StdRng) {
        (ActionSelector::new(&config), StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_jitter_bound() {
        let (sel, mut rng) = selector(LoopConfig { tol_pixels: 7, ..Default::default() });
        let center = region().target();
        let mut seen_offset = false;
        for _ in 0..1000 {
            let p = sel.click_point(&region(), &mut rng);
            assert_eq!(p.x, center.x);
            assert!((p.y - center.y).abs() <= 7, "{:?}", p);
            seen_offset |= p.y != center.y;
        }
        assert!(seen_offset);
    }

    #[test]
    fn test_zero_tolerance_clicks_center() {
        let (sel, mut rng) = selector(LoopConfig { tol_pixels: 0, ..Default::default() });
        assert_eq!(sel.click_point(&region(), &mut rng), Point::new(120, 210));
    }

    #[test]
    fn test_point_match_clicks_point() {
        let (sel, mut rng) = selector(LoopConfig { tol_pixels: 0, ..Default::default() });
        let found = MatchResult::Point { point: Point::new(3, 4), pairs: 9 };
        assert_eq!(sel.click_point(&found, &mut rng), Point::new(3, 4));
    }

    #[test]
    fn test_scroll_every_n_misses() {
        let (mut sel, _) = selector(LoopConfig { retries_before_scroll: 3, scroll_amount: 4, ..Default::default() });
        let actions: Vec<_> = (0..9).map(|_| sel.on_miss()).collect();
        let scrolls: Vec<usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| **a == Some(PointerAction::Scroll(4)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(scrolls, vec![2, 5, 8]);
    }

    #[test]
    fn test_match_resets_miss_countdown() {
        let (mut sel, mut rng) = selector(LoopConfig { retries_before_scroll: 2, ..Default::default() });
        assert_eq!(sel.on_miss(), None);
        sel.on_match("a", &region(), &mut rng);
        assert_eq!(sel.retries_left(), 2);
        assert_eq!(sel.on_miss(), None);
        assert!(sel.on_miss().is_some());
    }

    #[test]
    fn test_zero_retries_never_scrolls() {
        let (mut sel, _) = selector(LoopConfig { retries_before_scroll: 0, ..Default::default() });
        assert!((0..20).all(|_| sel.on_miss().is_none()));
    }

    #[test]
    fn test_overlay_streak_scrolls_on_fifth() {
        let (mut sel, mut rng) = selector(LoopConfig { scroll_amount: 5, ..Default::default() });
        for tick in 1..=4 {
            let actions = sel.on_match("ad", &region(), &mut rng);
            assert_eq!(actions.len(), 1, "tick {}", tick);
        }
        let actions = sel.on_match("ad", &region(), &mut rng);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], PointerAction::Click(_)));
        assert_eq!(actions[1], PointerAction::Scroll(5));
        assert_eq!(sel.streak(), 0);
        assert_eq!(sel.on_match("ad", &region(), &mut rng).len(), 1);
        assert_eq!(sel.streak(), 1);
    }

    #[test]
    fn test_overlay_disabled_never_scrolls() {
        let (mut sel, mut rng) = selector(LoopConfig { transparent_ads_fix: false, ..Default::default() });
        for _ in 0..50 {
            assert_eq!(sel.on_match("ad", &region(), &mut rng).len(), 1);
        }
    }

    #[test]
    fn test_streak_restarts_on_other_template_or_miss() {
        let (mut sel, mut rng) = selector(LoopConfig::default());
        for _ in 0..4 {
            sel.on_match("a", &region(), &mut rng);
        }
        sel.on_match("b", &region(), &mut rng);
        assert_eq!(sel.streak(), 1);
        for _ in 0..3 {
            sel.on_match("b", &region(), &mut rng);
        }
        sel.on_miss();
        assert_eq!(sel.streak(), 0);
        assert_eq!(sel.on_match("b", &region(), &mut rng).len(), 1);
    }
}
