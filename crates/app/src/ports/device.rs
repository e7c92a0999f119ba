//! Device/vision capability port: the only way tasks touch the device.
//!
//! One scheduler owns one capability and never calls it from two activities
//! at the same time, so implementations need no internal queueing.

use std::future::Future;

use minibot_domain::error::DeviceError;
use minibot_domain::vision::{Frame, Hsv, Location, Region, TemplateId};

/// Screen capture, image analysis and input simulation on one device.
pub trait DeviceCapability: Send + Sync {
    /// Capture the current screen.
    ///
    /// Fails with [`DeviceError::Capture`] when the device is unreachable.
    fn capture_frame(&self) -> impl Future<Output = Result<Frame, DeviceError>> + Send;

    /// Best match of `template` on `frame` at or above `confidence`.
    fn find_template(
        &self,
        frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Option<Location>, DeviceError>> + Send;

    /// Every match of `template` on `frame` at or above `confidence`.
    fn find_all_templates(
        &self,
        frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send;

    /// Recognize the text inside `region`, or on the whole frame.
    fn read_text(
        &self,
        frame: &Frame,
        region: Option<Region>,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send;

    /// Regions whose colour lies within `[lower, upper]`.
    fn find_color_regions(
        &self,
        frame: &Frame,
        lower: Hsv,
        upper: Hsv,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send;

    fn tap(&self, x: u32, y: u32) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn swipe(
        &self,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u64,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn input_text(&self, text: &str) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn launch_app(&self, app_id: &str) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Whether the device answers again; used to leave the paused state.
    fn is_available(&self) -> impl Future<Output = bool> + Send {
        async { self.capture_frame().await.is_ok() }
    }
}

impl<T: DeviceCapability> DeviceCapability for std::sync::Arc<T> {
    fn capture_frame(&self) -> impl Future<Output = Result<Frame, DeviceError>> + Send {
        (**self).capture_frame()
    }

    fn find_template(
        &self,
        frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Option<Location>, DeviceError>> + Send {
        (**self).find_template(frame, template, confidence)
    }

    fn find_all_templates(
        &self,
        frame: &Frame,
        template: &TemplateId,
        confidence: f32,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send {
        (**self).find_all_templates(frame, template, confidence)
    }

    fn read_text(
        &self,
        frame: &Frame,
        region: Option<Region>,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send {
        (**self).read_text(frame, region)
    }

    fn find_color_regions(
        &self,
        frame: &Frame,
        lower: Hsv,
        upper: Hsv,
    ) -> impl Future<Output = Result<Vec<Location>, DeviceError>> + Send {
        (**self).find_color_regions(frame, lower, upper)
    }

    fn tap(&self, x: u32, y: u32) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).tap(x, y)
    }

    fn swipe(
        &self,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u64,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).swipe(from, to, duration_ms)
    }

    fn input_text(&self, text: &str) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).input_text(text)
    }

    fn launch_app(&self, app_id: &str) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).launch_app(app_id)
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        (**self).is_available()
    }
}
