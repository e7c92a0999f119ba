//! # minibot-adapter-virtual
//!
//! Virtual device that implements the device/vision capability on top of a
//! scripted in-memory screen, for demos, dry runs and end-to-end tests.
//!
//! ## Behaviour
//!
//! | Capability | Virtual behaviour |
//! |------------|-------------------|
//! | capture | Numbered blank frames; fails while the device is unreachable |
//! | template matching | Elements placed with [`VirtualDevice::show`] |
//! | text recognition | Text blocks set with [`VirtualDevice::set_text`] |
//! | colour regions | Regions added with [`VirtualDevice::add_color_region`] |
//! | tap | Dismisses the elements hit, then runs their tap reactions |
//! | launch app | Runs the launch reactions of the app |
//!
//! Every input is recorded in an action log.
//!
//! ## Dependency rule
//!
//! Depends on `minibot-app` (port traits) and `minibot-domain` only.

mod screen;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minibot_app::ports::DeviceCapability;
use minibot_domain::error::DeviceError;
use minibot_domain::time;
use minibot_domain::vision::{Frame, Hsv, Location, Region, TemplateId};

pub use screen::Action;
use screen::{Element, Reaction, Screen};

const DEFAULT_CONFIDENCE: f32 = 0.95;

/// A scripted device.
pub struct VirtualDevice {
    width: u32,
    height: u32,
    latency: Duration,
    screen: Mutex<Screen>,
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            latency: Duration::ZERO,
            screen: Mutex::new(Screen::default()),
        }
    }
}

impl VirtualDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every capture and input by `latency`, like a real device would.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn screen(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ──────────────────────────────────────────────

    /// Put `template` on screen at `region`; it is dismissed when tapped.
    pub fn show(&self, template: &str, region: Region) {
        self.screen().react(Reaction::Reveal(element(template, region, false)));
    }

    /// Put `template` on screen at `region`; it stays when tapped.
    pub fn show_persistent(&self, template: &str, region: Region) {
        self.screen().react(Reaction::Reveal(element(template, region, true)));
    }

    /// Remove every match of `template`.
    pub fn hide(&self, template: &str) {
        self.screen().react(Reaction::Hide(TemplateId::from(template)));
    }

    /// OCR text of `region`, or of the whole screen with `None`.
    pub fn set_text(&self, region: Option<Region>, text: impl Into<String>) {
        self.screen().set_text(region, text.into());
    }

    pub fn add_color_region(&self, colour: Hsv, region: Region) {
        self.screen().colors.push((colour, region));
    }

    pub fn set_reachable(&self, reachable: bool) {
        tracing::debug!(reachable, "virtual device reachability changed");
        self.screen().reachable = reachable;
    }

    /// When `trigger` is tapped, show `template` at `region`.
    pub fn reveal_on_tap(&self, trigger: &str, template: &str, region: Region) {
        self.screen().on_tap.push((
            TemplateId::from(trigger),
            Reaction::Reveal(element(template, region, false)),
        ));
    }

    /// When `trigger` is tapped, change the OCR text of `region`.
    pub fn set_text_on_tap(&self, trigger: &str, region: Option<Region>, text: impl Into<String>) {
        self.screen().on_tap.push((
            TemplateId::from(trigger),
            Reaction::SetText(region, text.into()),
        ));
    }

    /// When `app_id` is launched, show `template` at `region`.
    pub fn reveal_on_launch(&self, app_id: &str, template: &str, region: Region) {
        self.screen().on_launch.push((
            app_id.to_string(),
            Reaction::Reveal(element(template, region, true)),
        ));
    }

    // ── Inspection ─────────────────────────────────────────────

    /// Inputs received so far, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.screen().actions.clone()
    }

    #[must_use]
    pub fn captures(&self) -> u64 {
        self.screen().captures
    }

    #[must_use]
    pub fn is_visible(&self, template: &str) -> bool {
        !self
            .screen()
            .matches(&TemplateId::from(template), 0.0)
            .is_empty()
    }

    async fn respond(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn act(&self, action: &'static str, apply: impl FnOnce(&mut Screen)) -> Result<(), DeviceError> {
        let mut screen = self.screen();
        if !screen.reachable {
            return Err(DeviceError::Action {
                action,
                reason: "device unreachable".to_string(),
            });
        }
        apply(&mut screen);
        Ok(())
    }
}

fn element(template: &str, region: Region, persistent: bool) -> Element {
    Element {
        template: TemplateId::from(template),
        location: Location::new(region, DEFAULT_CONFIDENCE),
        persistent,
    }
}

impl DeviceCapability for VirtualDevice {
    async fn capture_frame(&self) -> Result<Frame, DeviceError> {
        self.respond().await;
        let mut screen = self.screen();
        if !screen.reachable {
            return Err(DeviceError::Capture("virtual device unreachable".to_string()));
        }
        screen.captures += 1;
        Ok(Frame::new(screen.captures, self.width, self.height, time::now()))
    }

    async fn find_template(
        &self,
        _frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> Result<Option<Location>, DeviceError> {
        let best = self
            .screen()
            .matches(template, confidence)
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        Ok(best)
    }

    async fn find_all_templates(
        &self,
        _frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> Result<Vec<Location>, DeviceError> {
        Ok(self.screen().matches(template, confidence))
    }

    async fn read_text(&self, _frame: &Frame, region: Option<Region>) -> Result<String, DeviceError> {
        Ok(self.screen().text_at(region))
    }

    async fn find_color_regions(
        &self,
        _frame: &Frame,
        lower: Hsv,
        upper: Hsv,
    ) -> Result<Vec<Location>, DeviceError> {
        Ok(self.screen().colored(lower, upper))
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.respond().await;
        tracing::debug!(x, y, "virtual tap");
        self.act("tap", |screen| screen.tap(x, y))
    }

    async fn swipe(
        &self,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u64,
    ) -> Result<(), DeviceError> {
        self.respond().await;
        self.act("swipe", |screen| {
            screen.actions.push(Action::Swipe {
                from,
                to,
                duration_ms,
            });
        })
    }

    async fn input_text(&self, text: &str) -> Result<(), DeviceError> {
        self.respond().await;
        self.act("input_text", |screen| {
            screen.actions.push(Action::InputText {
                text: text.to_string(),
            });
        })
    }

    async fn launch_app(&self, app_id: &str) -> Result<(), DeviceError> {
        self.respond().await;
        tracing::debug!(app_id, "virtual app launch");
        self.act("launch_app", |screen| screen.launch(app_id))
    }
}
