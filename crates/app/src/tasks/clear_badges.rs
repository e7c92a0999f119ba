//! `clear_badges`: tap every notification badge of a colour until none remain.

use async_trait::async_trait;
use serde::Deserialize;

use minibot_domain::vision::{Hsv, Location};

use crate::ports::DeviceCapability;
use crate::task::{StepError, Task, TaskContext};
use crate::task_registry::TaskKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClearBadgesParams {
    pub lower: Hsv,
    pub upper: Hsv,
    /// Upper bound on taps per cycle.
    pub max_taps: usize,
}

impl Default for ClearBadgesParams {
    fn default() -> Self {
        // Saturated red, as used by most notification dots.
        Self {
            lower: Hsv::new(0, 150, 150),
            upper: Hsv::new(10, 255, 255),
            max_taps: 10,
        }
    }
}

#[derive(Debug)]
pub struct ClearBadges {
    params: ClearBadgesParams,
    badges: Vec<Location>,
}

impl TaskKind for ClearBadges {
    const KIND: &'static str = "clear_badges";
    type Params = ClearBadgesParams;

    fn from_params(params: Self::Params) -> Result<Self, String> {
        if params.max_taps == 0 {
            return Err("max_taps must be greater than zero".to_string());
        }
        let (lower, upper) = (params.lower, params.upper);
        if lower.h > upper.h || lower.s > upper.s || lower.v > upper.v {
            return Err("lower colour bound must not exceed upper bound".to_string());
        }
        Ok(Self {
            params,
            badges: Vec::new(),
        })
    }
}

impl ClearBadges {
    async fn scan<D: DeviceCapability>(
        &self,
        ctx: &TaskContext<'_, D>,
    ) -> Result<Vec<Location>, StepError> {
        let frame = ctx.device().capture_frame().await?;
        let found = ctx
            .device()
            .find_color_regions(&frame, self.params.lower, self.params.upper)
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for ClearBadges {
    async fn check(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        self.badges = self.scan(ctx).await?;
        Ok(!self.badges.is_empty())
    }

    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        let badges = std::mem::take(&mut self.badges);
        for badge in badges.iter().take(self.params.max_taps) {
            if ctx.stop_requested() {
                break;
            }
            let (x, y) = badge.center();
            ctx.device().tap(x, y).await?;
            ctx.pause_randomized().await?;
        }
        tracing::debug!(count = badges.len().min(self.params.max_taps), "badges tapped");
        Ok(())
    }

    async fn verify(&mut self, ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        Ok(self.scan(ctx).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, context_env};
    use minibot_domain::vision::Region;

    fn task(max_taps: usize) -> ClearBadges {
        ClearBadges::from_params(ClearBadgesParams {
            max_taps,
            ..ClearBadgesParams::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn should_skip_when_no_badge_visible() {
        let device = FakeDevice::default();
        let env = context_env();
        let ctx = env.context(&device);
        assert!(!task(10).check(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn should_tap_every_badge_then_verify_none_remain() {
        let device = FakeDevice::default();
        device.add_color_region(Region::new(10, 10, 4, 4));
        device.add_color_region(Region::new(50, 10, 4, 4));
        let env = context_env();
        let ctx = env.context(&device);
        let mut task = task(10);

        assert!(task.check(&ctx).await.unwrap());
        task.execute(&ctx).await.unwrap();
        assert_eq!(device.taps(), vec![(12, 12), (52, 12)]);
        assert!(task.verify(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn should_fail_verification_when_taps_are_capped() {
        let device = FakeDevice::default();
        device.add_color_region(Region::new(10, 10, 4, 4));
        device.add_color_region(Region::new(50, 10, 4, 4));
        let env = context_env();
        let ctx = env.context(&device);
        let mut task = task(1);

        assert!(task.check(&ctx).await.unwrap());
        task.execute(&ctx).await.unwrap();
        assert_eq!(device.taps().len(), 1);
        assert!(!task.verify(&ctx).await.unwrap());
    }

    #[test]
    fn should_reject_inverted_colour_bounds() {
        let result = ClearBadges::from_params(ClearBadgesParams {
            lower: Hsv::new(20, 0, 0),
            upper: Hsv::new(10, 255, 255),
            max_taps: 1,
        });
        assert!(result.is_err());
    }
}
