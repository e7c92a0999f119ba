//! `safety_watch`: halt everything when a danger marker is on screen.
//!
//! Typical markers are an abuse-detection dialog or an incoming attack
//! warning. Any hit raises a critical safety condition, which halts the
//! scheduler until an operator resumes it.

use async_trait::async_trait;
use serde::Deserialize;

use minibot_domain::vision::TemplateId;

use super::check_confidence;
use crate::ports::DeviceCapability;
use crate::task::{StepError, Task, TaskContext};
use crate::task_registry::TaskKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyWatchParams {
    pub templates: Vec<TemplateId>,
    #[serde(default = "default_watch_confidence")]
    pub confidence: f32,
}

fn default_watch_confidence() -> f32 {
    0.85
}

#[derive(Debug)]
pub struct SafetyWatch {
    params: SafetyWatchParams,
}

impl TaskKind for SafetyWatch {
    const KIND: &'static str = "safety_watch";
    type Params = SafetyWatchParams;

    fn from_params(params: Self::Params) -> Result<Self, String> {
        if params.templates.is_empty() {
            return Err("templates must list at least one danger marker".to_string());
        }
        check_confidence(params.confidence)?;
        Ok(Self { params })
    }
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for SafetyWatch {
    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        let frame = ctx.device().capture_frame().await?;
        for template in &self.params.templates {
            let hit = ctx
                .device()
                .find_template(&frame, template, self.params.confidence)
                .await?;
            if let Some(location) = hit {
                tracing::error!(%template, confidence = location.confidence, "danger marker on screen");
                return Err(StepError::Critical(format!("{template} detected")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, context_env};
    use minibot_domain::vision::Region;

    fn task() -> SafetyWatch {
        SafetyWatch::from_params(SafetyWatchParams {
            templates: vec![
                TemplateId::from("dialogs/captcha"),
                TemplateId::from("alerts/incoming_attack"),
            ],
            confidence: 0.85,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn should_pass_when_screen_is_clear() {
        let device = FakeDevice::default();
        let env = context_env();
        let ctx = env.context(&device);
        let mut task = task();
        assert!(task.check(&ctx).await.unwrap());
        task.execute(&ctx).await.unwrap();
        assert!(task.verify(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn should_raise_critical_when_marker_visible() {
        let device = FakeDevice::default();
        device.show("alerts/incoming_attack", Region::new(0, 0, 300, 80));
        let env = context_env();
        let ctx = env.context(&device);
        let result = task().execute(&ctx).await;
        assert_eq!(
            result,
            Err(StepError::Critical("alerts/incoming_attack detected".to_string()))
        );
    }

    #[test]
    fn should_reject_empty_marker_list() {
        let result = SafetyWatch::from_params(SafetyWatchParams {
            templates: Vec::new(),
            confidence: 0.85,
        });
        assert!(result.is_err());
    }
}
