pub mod desktop;
pub mod stub;

use image::RgbaImage;

use crate::error::Result;
use crate::logger;
use crate::types::Point;

/// Screen capture and pointer simulation. Coordinates are screenshot pixels.
///
/// Pointer operations return `BotError::FailSafe` when the user has parked
/// the pointer in a screen corner to abort the bot.
pub trait Platform {
    fn capture_screen(&mut self) -> Result<RgbaImage>;
    fn click(&mut self, at: Point) -> Result<()>;
    /// Positive scrolls down.
    fn scroll(&mut self, amount: i32) -> Result<()>;
    fn move_to(&mut self, at: Point) -> Result<()>;
    fn pointer_position(&mut self) -> Result<Point>;
}

/// Create the platform for this machine, or the logging stub.
pub fn create_platform(force_stub: bool) -> Result<Box<dyn Platform>> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Ok(Box::new(stub::StubPlatform::new()));
    }
    logger::register_prefix("desktop", logger::COLOR_GRAY);
    Ok(Box::new(desktop::DesktopPlatform::new()?))
}
