//! `read_counter`: read a number on screen and require it inside a range.

use async_trait::async_trait;
use serde::Deserialize;

use minibot_domain::vision::Region;

use crate::ports::DeviceCapability;
use crate::task::{StepError, Task, TaskContext};
use crate::task_registry::TaskKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadCounterParams {
    /// Area holding the number; whole screen when absent.
    pub region: Option<Region>,
    pub min: i64,
    pub max: i64,
    /// Name used in logs (e.g. `action_points`).
    pub label: String,
}

impl Default for ReadCounterParams {
    fn default() -> Self {
        Self {
            region: None,
            min: 0,
            max: i64::MAX,
            label: "counter".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ReadCounter {
    params: ReadCounterParams,
    last_value: Option<i64>,
}

impl ReadCounter {
    /// Value read by the last execution.
    #[must_use]
    pub fn last_value(&self) -> Option<i64> {
        self.last_value
    }
}

impl TaskKind for ReadCounter {
    const KIND: &'static str = "read_counter";
    type Params = ReadCounterParams;

    fn from_params(params: Self::Params) -> Result<Self, String> {
        if params.min > params.max {
            return Err(format!(
                "min ({}) must not exceed max ({})",
                params.min, params.max
            ));
        }
        Ok(Self {
            params,
            last_value: None,
        })
    }
}

/// First integer in `text`, ignoring thousands separators (`"AP 1,250/2000"` → 1250).
///
/// A separator only counts as one when every group after it has exactly
/// three digits and a single separator character is used, so `"3.5"` and
/// `"1,250.75"` read as no counter at all.
fn parse_counter(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let negative = text[..start].ends_with('-');
    let token = text[start..]
        .split(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .next()?
        .trim_end_matches([',', '.']);

    let mut separators = token.chars().filter(|c| !c.is_ascii_digit());
    let first = separators.next();
    if separators.any(|c| Some(c) != first) {
        return None;
    }
    let mut groups = token.split([',', '.']);
    let head = groups.next()?;
    let mut digits = head.to_string();
    for group in groups {
        if head.len() > 3 || group.len() != 3 {
            return None;
        }
        digits.push_str(group);
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

#[async_trait]
impl<D: DeviceCapability> Task<D> for ReadCounter {
    async fn execute(&mut self, ctx: &TaskContext<'_, D>) -> Result<(), StepError> {
        let frame = ctx.device().capture_frame().await?;
        let text = ctx.device().read_text(&frame, self.params.region).await?;
        let value = parse_counter(&text).ok_or_else(|| {
            StepError::Failed(format!("no number in {:?} for {}", text, self.params.label))
        })?;
        tracing::info!(label = %self.params.label, value, "counter read");
        self.last_value = Some(value);
        Ok(())
    }

    async fn verify(&mut self, _ctx: &TaskContext<'_, D>) -> Result<bool, StepError> {
        Ok(self
            .last_value
            .is_some_and(|value| (self.params.min..=self.params.max).contains(&value)))
    }
}
