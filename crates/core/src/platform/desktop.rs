use enigo::{Axis, Button, Coordinate, Direction, Enigo, Mouse, Settings};
use image::RgbaImage;

use super::Platform;
use crate::error::{BotError, Result};
use crate::logger;
use crate::types::Point;

/// Primary monitor via xcap, pointer via enigo.
pub struct DesktopPlatform {
    enigo: Enigo,
    /// Pointer units per screenshot pixel (differs on HiDPI displays).
    scale: (f64, f64),
}

fn pointer_err(e: impl std::fmt::Display) -> BotError {
    BotError::Pointer(e.to_string())
}

impl DesktopPlatform {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| BotError::Platform(format!("cannot open input device: {}", e)))?;
        Ok(Self { enigo, scale: (1.0, 1.0) })
    }

    /// Moving the pointer into any screen corner aborts the bot.
    fn check_fail_safe(&self) -> Result<()> {
        let (x, y) = self.enigo.location().map_err(pointer_err)?;
        let (w, h) = self.enigo.main_display().map_err(pointer_err)?;
        let at_edge_x = x <= 0 || x >= w - 1;
        let at_edge_y = y <= 0 || y >= h - 1;
        if at_edge_x && at_edge_y {
            return Err(BotError::FailSafe);
        }
        Ok(())
    }

    fn to_pointer(&self, p: Point) -> (i32, i32) {
        (
            (p.x as f64 * self.scale.0).round() as i32,
            (p.y as f64 * self.scale.1).round() as i32,
        )
    }

    fn from_pointer(&self, (x, y): (i32, i32)) -> Point {
        Point::new(
            (x as f64 / self.scale.0).round() as i32,
            (y as f64 / self.scale.1).round() as i32,
        )
    }
}

/// Index of the primary monitor, else the first one.
fn pick_monitor(primary: &[bool]) -> Option<usize> {
    primary
        .iter()
        .position(|&p| p)
        .or_else(|| (!primary.is_empty()).then_some(0))
}

impl Platform for DesktopPlatform {
    fn capture_screen(&mut self) -> Result<RgbaImage> {
        let monitors = xcap::Monitor::all().map_err(|e| BotError::Capture(e.to_string()))?;
        let primary: Vec<bool> = monitors
            .iter()
            .map(|m| m.is_primary().unwrap_or(false))
            .collect();
        let index = pick_monitor(&primary).ok_or_else(|| BotError::Capture("no monitors found".into()))?;
        if !primary[index] {
            logger::warn_p("desktop", "no primary monitor reported, capturing the first one");
        }
        let monitor = &monitors[index];
        let image = monitor
            .capture_image()
            .map_err(|e| BotError::Capture(e.to_string()))?;

        match self.enigo.main_display() {
            Ok((w, h)) if w > 0 && h > 0 && image.width() > 0 && image.height() > 0 => {
                self.scale = (
                    w as f64 / image.width() as f64,
                    h as f64 / image.height() as f64,
                );
            }
            Ok(_) => {}
            Err(e) => logger::debug_p("desktop", &format!("display size unavailable: {}", e)),
        }
        Ok(image)
    }

    fn click(&mut self, at: Point) -> Result<()> {
        self.check_fail_safe()?;
        let (x, y) = self.to_pointer(at);
        self.enigo.move_mouse(x, y, Coordinate::Abs).map_err(pointer_err)?;
        self.enigo.button(Button::Left, Direction::Click).map_err(pointer_err)?;
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        self.check_fail_safe()?;
        self.enigo.scroll(amount, Axis::Vertical).map_err(pointer_err)
    }

    fn move_to(&mut self, at: Point) -> Result<()> {
        self.check_fail_safe()?;
        let (x, y) = self.to_pointer(at);
        self.enigo.move_mouse(x, y, Coordinate::Abs).map_err(pointer_err)
    }

    fn pointer_position(&mut self) -> Result<Point> {
        let location = self.enigo.location().map_err(pointer_err)?;
        Ok(self.from_pointer(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_monitor_prefers_primary() {
        assert_eq!(pick_monitor(&[false, true, false]), Some(1));
        assert_eq!(pick_monitor(&[true, false]), Some(0));
    }

    #[test]
    fn test_pick_monitor_falls_back_to_first() {
        assert_eq!(pick_monitor(&[false, false]), Some(0));
        assert_eq!(pick_monitor(&[]), None);
    }
}
