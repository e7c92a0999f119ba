//! `launch_app`: launch an app and wait until its ready marker appears.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use minibot_domain::vision::TemplateId;

use super::{check_confidence, default_confidence};
use crate::ports::DeviceCapability;
use crate::task::{StepError, Task, TaskContext};
use crate::task_registry::TaskKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchAppParams {
    pub app_id: String,
    /// Template visible once the app finished loading.
    pub ready_template: TemplateId,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Skip the cycle when the ready marker is already on screen.
    #[serde(default)]
    pub skip_if_ready: bool,
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug)]
pub struct LaunchApp {
    params: LaunchAppParams,
}

impl TaskKind for LaunchApp {
    const KIND: &'static str = "launch_app";
    type Params = LaunchAppParams;

    fn from_params(params: Self::Params) -> Result<Self, String> {
        if params.app_id.trim().is_empty() {
            return Err("app_id must not be empty".to_string());
        }
        if params.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        check_confidence(params.confidence)?;
        Ok(Self { params })
    }
}

impl LaunchApp {
    async fn ready<D: DeviceCapability>(&self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        let frame = ctx.device().capture_frame().await?;
        let found = ctx
            .device()
            .find_template(&frame, &self.params.ready_template, self.params.confidence)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for LaunchApp {
    async fn check(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        if self.params.skip_if_ready {
            return Ok(!self.ready(ctx).await?);
        }
        Ok(true)
    }

    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        ctx.device().launch_app(&self.params.app_id).await?;
        let poll = Duration::from_millis(self.params.poll_interval_ms);
        let mut waited = Duration::ZERO;
        let limit = Duration::from_secs(self.params.ready_timeout_secs);
        loop {
            if self.ready(ctx).await? {
                return Ok(());
            }
            if ctx.stop_requested() {
                tracing::debug!(app_id = %self.params.app_id, "stop requested, no longer waiting");
                return Ok(());
            }
            if waited >= limit {
                return Err(StepError::Failed(format!(
                    "{} not ready after {}s",
                    self.params.app_id, self.params.ready_timeout_secs
                )));
            }
            ctx.pause(poll).await?;
            waited += poll;
        }
    }

    async fn verify(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        self.ready(ctx).await
    }
}
