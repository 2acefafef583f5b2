//! The controller-transport collaborator: sets the orb's LED color.
//!
//! Grounded on `psmove_set_leds`/`psmove_update_leds` — a consumer-side-only
//! interface with no feedback, per spec §6.

use async_trait::async_trait;

use crate::error::AppResult;

/// Required operations from the controller transport. No feedback: the
/// facade cannot ask the LED what color it thinks it is showing.
#[async_trait]
pub trait LedController: Send + Sync {
    /// Sets the LED to `(r, g, b)` and flushes the update to the device.
    async fn set_leds(&mut self, r: u8, g: u8, b: u8) -> AppResult<()>;
}

/// Deterministic fake LED controller for tests: records the last color
/// commanded so assertions can check calibration actually toggled the orb.
#[derive(Clone, Debug, Default)]
pub struct MockLedController {
    pub last_rgb: Option<(u8, u8, u8)>,
    pub history: Vec<(u8, u8, u8)>,
}

impl MockLedController {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedController for MockLedController {
    async fn set_leds(&mut self, r: u8, g: u8, b: u8) -> AppResult<()> {
        self.last_rgb = Some((r, g, b));
        self.history.push((r, g, b));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_led_records_last_and_full_history() {
        let mut led = MockLedController::new();
        led.set_leds(255, 0, 255).await.unwrap();
        led.set_leds(0, 0, 0).await.unwrap();
        assert_eq!(led.last_rgb, Some((0, 0, 0)));
        assert_eq!(led.history, vec![(255, 0, 255), (0, 0, 0)]);
    }
}
