//! Config Flow Handler Trait
//!
//! Defines the interface integrations implement to provide the steps of a
//! configuration flow.

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::result::StepResult;

/// Input submitted by the user for a step
pub type UserInput = serde_json::Map<String, serde_json::Value>;

/// Step every flow starts at
pub const STEP_INIT: &str = "init";

/// Trait for the steps of a configuration flow
///
/// A fresh handler is created for each flow, so implementations are free to
/// keep data gathered in one step for use in a later one.
///
/// The step table returned by [`step_ids`](Self::step_ids) is authoritative:
/// the manager never dispatches a step that is not listed there.
///
/// # Example
///
/// ```ignore
/// #[derive(Default)]
/// struct HueFlow {
///     host: Option<String>,
/// }
///
/// #[async_trait]
/// impl ConfigFlowHandler for HueFlow {
///     fn step_ids(&self) -> &[&'static str] {
///         &["init", "link"]
///     }
///
///     async fn async_step(&mut self, step_id: &str, user_input: Option<UserInput>) -> FlowResult<StepResult> {
///         match step_id {
///             "init" => self.async_step_init(user_input).await,
///             "link" => self.async_step_link(user_input).await,
///             _ => Err(FlowError::UnknownStep { handler: "hue".into(), step_id: step_id.into() }),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ConfigFlowHandler: Send {
    /// Schema version of the entries this flow creates
    fn version(&self) -> u32 {
        1
    }

    /// Names of the steps this handler implements
    fn step_ids(&self) -> &[&'static str];

    /// Whether `step_id` is in the step table
    fn has_step(&self, step_id: &str) -> bool {
        self.step_ids().contains(&step_id)
    }

    /// Run a step
    ///
    /// # Arguments
    /// * `step_id` - A step from [`step_ids`](Self::step_ids)
    /// * `user_input` - Input for the step, or `None` to show its form
    async fn async_step(
        &mut self,
        step_id: &str,
        user_input: Option<UserInput>,
    ) -> FlowResult<StepResult>;
}
