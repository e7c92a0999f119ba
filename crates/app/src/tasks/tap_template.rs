//! `tap_template`: tap a UI element found by template and check it went away.

use async_trait::async_trait;
use serde::Deserialize;

use minibot_domain::vision::{Location, TemplateId};

use super::{check_confidence, default_confidence};
use crate::ports::DeviceCapability;
use crate::task::{StepError, Task, TaskContext};
use crate::task_registry::TaskKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapTemplateParams {
    pub template: TemplateId,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Verify by checking the element is no longer visible.
    #[serde(default = "default_true")]
    pub verify_disappears: bool,
}

fn default_true() -> bool {
    true
}

/// Tap the element when it is visible; skip otherwise.
#[derive(Debug)]
pub struct TapTemplate {
    params: TapTemplateParams,
    target: Option<Location>,
}

impl TaskKind for TapTemplate {
    const KIND: &'static str = "tap_template";
    type Params = TapTemplateParams;

    fn from_params(params: Self::Params) -> Result<Self, String> {
        check_confidence(params.confidence)?;
        Ok(Self {
            params,
            target: None,
        })
    }
}

impl TapTemplate {
    async fn locate<D: DeviceCapability>(
        &self,
        ctx: &TaskContext<'_, D>,
    ) -> Result<Option<Location>, StepError> {
        let frame = ctx.device().capture_frame().await?;
        let found = ctx
            .device()
            .find_template(&frame, &self.params.template, self.params.confidence)
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for TapTemplate {
    async fn check(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        self.target = self.locate(ctx).await?;
        Ok(self.target.is_some())
    }

    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        let target = match self.target.take() {
            Some(target) => target,
            None => self.locate(ctx).await?.ok_or_else(|| {
                StepError::Failed(format!("{} is no longer visible", self.params.template))
            })?,
        };
        let (x, y) = target.center();
        tracing::debug!(template = %self.params.template, x, y, "tapping template");
        ctx.device().tap(x, y).await?;
        ctx.pause_randomized().await
    }

    async fn verify(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        if !self.params.verify_disappears {
            return Ok(true);
        }
        Ok(self.locate(ctx).await?.is_none())
    }
}
