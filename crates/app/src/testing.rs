//! In-memory test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use minibot_domain::error::{DeviceError, MiniBotError};
use minibot_domain::event::SchedulerEvent;
use minibot_domain::id::ActivityId;
use minibot_domain::time::{self, Timestamp};
use minibot_domain::vision::{Frame, Hsv, Location, Region, TemplateId};

use crate::ports::{Clock, DeviceCapability, EventPublisher, ManualClock};
use crate::settings::Pacing;
use crate::task::{Phase, StepError, Task, TaskContext};

/// 2026-03-10 12:00:00 UTC.
pub(crate) fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

// ── Fake device ────────────────────────────────────────────────

#[derive(Debug)]
struct Screen {
    reachable: bool,
    sticky: bool,
    templates: HashMap<TemplateId, Vec<Location>>,
    on_launch: Vec<(TemplateId, Location)>,
    text: String,
    colors: Vec<(Hsv, Region)>,
    taps: Vec<(u32, u32)>,
    launched: Vec<String>,
    captures: u64,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            reachable: true,
            sticky: false,
            templates: HashMap::new(),
            on_launch: Vec::new(),
            text: String::new(),
            colors: Vec::new(),
            taps: Vec::new(),
            launched: Vec::new(),
            captures: 0,
        }
    }
}

/// Scriptable screen: tapping inside a visible element removes it unless
/// the screen is sticky.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    screen: Mutex<Screen>,
}

impl FakeDevice {
    fn screen(&self) -> std::sync::MutexGuard<'_, Screen> {
        self.screen.lock().unwrap()
    }

    pub(crate) fn show(&self, template: &str, region: Region) {
        self.screen()
            .templates
            .entry(TemplateId::from(template))
            .or_default()
            .push(Location::new(region, 0.95));
    }

    pub(crate) fn on_launch(&self, template: &str, region: Region) {
        self.screen()
            .on_launch
            .push((TemplateId::from(template), Location::new(region, 0.95)));
    }

    pub(crate) fn set_text(&self, text: &str) {
        self.screen().text = text.to_string();
    }

    pub(crate) fn add_color_region(&self, region: Region) {
        self.screen().colors.push((Hsv::new(5, 200, 200), region));
    }

    pub(crate) fn set_sticky(&self, sticky: bool) {
        self.screen().sticky = sticky;
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.screen().reachable = reachable;
    }

    pub(crate) fn taps(&self) -> Vec<(u32, u32)> {
        self.screen().taps.clone()
    }

    pub(crate) fn launched(&self) -> Vec<String> {
        self.screen().launched.clone()
    }

    fn check_reachable(&self, action: &'static str) -> Result<(), DeviceError> {
        if self.screen().reachable {
            Ok(())
        } else {
            Err(DeviceError::Action {
                action,
                reason: "device unreachable".to_string(),
            })
        }
    }
}

impl DeviceCapability for FakeDevice {
    fn capture_frame(&self) -> impl Future<Output = Result<Frame, DeviceError>> + Send {
        let mut screen = self.screen();
        let result = if screen.reachable {
            screen.captures += 1;
            Ok(Frame::new(screen.captures, 1080, 1920, time::now()))
        } else {
            Err(DeviceError::Capture("no response from device".to_string()))
        };
        async move { result }
    }

    fn find_template(
        &self,
        _frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Option<Location>, DeviceError>> + Send {
        let found = self
            .screen()
            .templates
            .get(template)
            .and_then(|locations| locations.iter().find(|l| l.confidence >= confidence))
            .copied();
        async move { Ok(found) }
    }

    fn find_all_templates(
        &self,
        _frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send {
        let found: Vec<_> = self
            .screen()
            .templates
            .get(template)
            .map(|locations| {
                locations
                    .iter()
                    .filter(|l| l.confidence >= confidence)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        async move { Ok(found) }
    }

    fn read_text(
        &self,
        _frame: &Frame,
        _region: Option<Region>,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send {
        let text = self.screen().text.clone();
        async move { Ok(text) }
    }

    fn find_color_regions(
        &self,
        _frame: &Frame,
        lower: Hsv,
        upper: Hsv,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send {
        let found: Vec<_> = self
            .screen()
            .colors
            .iter()
            .filter(|(colour, _)| colour.within(lower, upper))
            .map(|(_, region)| Location::new(*region, 1.0))
            .collect();
        async move { Ok(found) }
    }

    fn tap(&self, x: u32, y: u32) -> impl Future<Output = Result<(), DeviceError>> + Send {
        let result = self.check_reachable("tap").map(|()| {
            let mut screen = self.screen();
            screen.taps.push((x, y));
            if !screen.sticky {
                for locations in screen.templates.values_mut() {
                    locations.retain(|l| !l.region.contains(x, y));
                }
                screen.colors.retain(|(_, region)| !region.contains(x, y));
            }
        });
        async move { result }
    }

    fn swipe(
        &self,
        _from: (u32, u32),
        _to: (u32, u32),
        _duration_ms: u64,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        let result = self.check_reachable("swipe");
        async move { result }
    }

    fn input_text(&self, _text: &str) -> impl Future<Output = Result<(), DeviceError>> + Send {
        let result = self.check_reachable("input_text");
        async move { result }
    }

    fn launch_app(&self, app_id: &str) -> impl Future<Output = Result<(), DeviceError>> + Send {
        let result = self.check_reachable("launch_app").map(|()| {
            let mut screen = self.screen();
            screen.launched.push(app_id.to_string());
            let shown = std::mem::take(&mut screen.on_launch);
            for (template, location) in shown {
                screen.templates.entry(template).or_default().push(location);
            }
        });
        async move { result }
    }
}

// ── Task context outside the runner ────────────────────────────

/// Owns what a [`TaskContext`] borrows, with a five minute budget.
pub(crate) struct ContextEnv {
    pub(crate) clock: ManualClock,
    activity_id: ActivityId,
    stop: AtomicBool,
}

pub(crate) fn context_env() -> ContextEnv {
    ContextEnv {
        clock: ManualClock::new(t0()),
        activity_id: "under_test".parse().unwrap(),
        stop: AtomicBool::new(false),
    }
}

impl ContextEnv {
    pub(crate) fn context<'a, D: DeviceCapability>(&'a self, device: &'a D) -> TaskContext<'a, D> {
        TaskContext::new(
            device,
            &self.clock,
            &self.activity_id,
            &self.stop,
            Pacing::none(),
            time::add(t0(), Duration::from_secs(300)),
        )
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Simulated time spent since the context was created.
    pub(crate) fn elapsed(&self) -> Duration {
        time::elapsed(t0(), self.clock.now())
    }
}

// ── Scripted task ──────────────────────────────────────────────

/// Task whose step results are fixed up front; records the steps it ran.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedTask {
    pub(crate) check: Result<bool, StepError>,
    pub(crate) execute: Result<(), StepError>,
    pub(crate) verify: Result<bool, StepError>,
    /// Simulated work inside `execute`, taken from the execution budget.
    pub(crate) execute_takes: Duration,
    pub(crate) panic_in_execute: bool,
    pub(crate) steps: Arc<Mutex<Vec<Phase>>>,
}

impl ScriptedTask {
    pub(crate) fn succeeding() -> Self {
        Self {
            check: Ok(true),
            execute: Ok(()),
            verify: Ok(true),
            execute_takes: Duration::ZERO,
            panic_in_execute: false,
            steps: Arc::default(),
        }
    }

    pub(crate) fn skipping() -> Self {
        Self {
            check: Ok(false),
            ..Self::succeeding()
        }
    }

    pub(crate) fn failing(error: StepError) -> Self {
        Self {
            execute: Err(error),
            ..Self::succeeding()
        }
    }

    pub(crate) fn unverified() -> Self {
        Self {
            verify: Ok(false),
            ..Self::succeeding()
        }
    }

    pub(crate) fn steps(&self) -> Vec<Phase> {
        self.steps.lock().unwrap().clone()
    }

    fn record(&self, phase: Phase) {
        self.steps.lock().unwrap().push(phase);
    }
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for ScriptedTask {
    async fn check(&mut self, _ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        self.record(Phase::Check);
        self.check.clone()
    }

    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        self.record(Phase::Execute);
        assert!(!self.panic_in_execute, "scripted panic");
        if !self.execute_takes.is_zero() {
            ctx.pause(self.execute_takes).await?;
        }
        self.execute.clone()
    }

    async fn verify(&mut self, _ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        self.record(Phase::Verify);
        self.verify.clone()
    }
}

// ── Recording publisher ────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl RecordingPublisher {
    pub(crate) fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(
        &self,
        event: SchedulerEvent,
    ) -> impl Future<Output = Result<(), MiniBotError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}

pub(crate) fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(t0()))
}
