//! Built-in task variants.
//!
//! | kind | does |
//! |---|---|
//! | `tap_template` | taps a visible UI element and checks it went away |
//! | `launch_app` | launches an app and waits for a ready marker |
//! | `read_counter` | reads a number on screen and checks its range |
//! | `clear_badges` | taps every notification badge of a colour |
//! | `safety_watch` | halts the scheduler when a danger marker shows up |

mod clear_badges;
mod launch_app;
mod read_counter;
mod safety_watch;
mod tap_template;

pub use clear_badges::{ClearBadges, ClearBadgesParams};
pub use launch_app::{LaunchApp, LaunchAppParams};
pub use read_counter::{ReadCounter, ReadCounterParams};
pub use safety_watch::{SafetyWatch, SafetyWatchParams};
pub use tap_template::{TapTemplate, TapTemplateParams};

pub(crate) const DEFAULT_CONFIDENCE: f32 = 0.8;

pub(crate) fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

pub(crate) fn check_confidence(confidence: f32) -> Result<(), String> {
    if confidence > 0.0 && confidence <= 1.0 {
        Ok(())
    } else {
        Err(format!("confidence must be within (0, 1], got {confidence}"))
    }
}
