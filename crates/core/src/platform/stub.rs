use image::{Rgba, RgbaImage};

use super::Platform;
use crate::error::Result;
use crate::logger;
use crate::types::Point;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Dry-run platform: a blank screen and a pointer that only logs.
pub struct StubPlatform {
    pointer: Point,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self { pointer: Point::new(WIDTH as i32 / 2, HEIGHT as i32 / 2) }
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StubPlatform {
    fn capture_screen(&mut self) -> Result<RgbaImage> {
        logger::debug_p("stub", &format!("capture_screen() -> {}x{}", WIDTH, HEIGHT));
        Ok(RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([32, 32, 32, 255])))
    }

    fn click(&mut self, at: Point) -> Result<()> {
        logger::info_p("stub", &format!("click{}", at));
        self.pointer = at;
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        logger::info_p("stub", &format!("scroll({})", amount));
        Ok(())
    }

    fn move_to(&mut self, at: Point) -> Result<()> {
        logger::debug_p("stub", &format!("move_to{}", at));
        self.pointer = at;
        Ok(())
    }

    fn pointer_position(&mut self) -> Result<Point> {
        Ok(self.pointer)
    }
}
