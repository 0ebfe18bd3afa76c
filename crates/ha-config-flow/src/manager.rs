//! Config Flow Manager
//!
//! Creates flows from registered handlers, resumes them with user input and
//! retires them once a step finishes the flow.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::entry::{EntrySink, FlowEntry, FlowSource};
use crate::error::{FlowError, FlowResult};
use crate::handler::{ConfigFlowHandler, UserInput, STEP_INIT};
use crate::registry::HandlerRegistry;
use crate::result::StepResult;
use crate::DEFAULT_RESERVED_STEPS;

/// Default time an idle flow stays alive (1 hour)
const DEFAULT_FLOW_TTL_SECS: u64 = 3600;

/// Flow manager settings
#[derive(Debug, Clone)]
pub struct FlowManagerConfig {
    /// Steps clients may not request directly
    pub reserved_steps: HashSet<String>,
    /// Idle time after which a flow is dropped, `None` keeps flows forever
    pub flow_ttl: Option<Duration>,
}

impl Default for FlowManagerConfig {
    fn default() -> Self {
        Self {
            reserved_steps: DEFAULT_RESERVED_STEPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            flow_ttl: Some(Duration::from_secs(DEFAULT_FLOW_TTL_SECS)),
        }
    }
}

/// Result of starting or progressing a flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    /// Flow ID; already retired when `result` is terminal
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    pub result: StepResult,
}

/// Snapshot of a live flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowProgress {
    pub flow_id: String,
    pub handler: String,
    /// Step awaiting input, `None` while a step is running
    pub step_id: Option<String>,
    pub source: FlowSource,
    pub started_at: DateTime<Utc>,
}

/// A live flow
struct ActiveFlow {
    flow_id: String,
    handler: String,
    source: FlowSource,
    started_at: DateTime<Utc>,
    /// Held for the whole duration of a step
    state: Mutex<FlowState>,
}

struct FlowState {
    /// Step the next input goes to
    step_id: String,
    last_activity: DateTime<Utc>,
    /// Set when the flow leaves the live set
    retired: bool,
    instance: Box<dyn ConfigFlowHandler>,
}

/// Config Flow Manager
///
/// Flows for different ids run independently. Steps of one flow are
/// serialized: a second call waits until the running step has finished and
/// then sees the flow's new state.
pub struct FlowManager {
    registry: Arc<HandlerRegistry>,
    config: FlowManagerConfig,
    /// Live flows: flow_id -> flow
    flows: DashMap<String, Arc<ActiveFlow>>,
    entry_sink: Option<Arc<dyn EntrySink>>,
}

impl FlowManager {
    /// Create a manager over a handler registry
    pub fn new(registry: Arc<HandlerRegistry>, config: FlowManagerConfig) -> Self {
        Self {
            registry,
            config,
            flows: DashMap::new(),
            entry_sink: None,
        }
    }

    /// Hand finished entries to `sink`
    pub fn with_entry_sink(mut self, sink: Arc<dyn EntrySink>) -> Self {
        self.entry_sink = Some(sink);
        self
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Reject steps that may only be reached internally
    pub fn check_step_access(&self, step_id: &str) -> FlowResult<()> {
        if self.config.reserved_steps.contains(step_id) {
            warn!(step_id = %step_id, "Rejected direct request for reserved step");
            return Err(FlowError::ReservedStep(step_id.to_string()));
        }
        Ok(())
    }

    /// Start a flow on behalf of a client
    ///
    /// `requested_step` is the step the client asked for, if any. It is only
    /// checked against the reserved steps; client flows always start at
    /// `init`.
    #[instrument(skip(self))]
    pub async fn async_init(
        &self,
        handler: &str,
        requested_step: Option<&str>,
    ) -> FlowResult<FlowOutcome> {
        if let Some(step_id) = requested_step {
            self.check_step_access(step_id)?;
        }
        self.start_flow(handler, STEP_INIT, FlowSource::User, None)
            .await
    }

    /// Start a flow internally, e.g. from discovery
    ///
    /// Unlike [`async_init`](Self::async_init) this may start at a reserved step.
    #[instrument(skip(self, user_input))]
    pub async fn async_init_at(
        &self,
        handler: &str,
        step_id: &str,
        source: FlowSource,
        user_input: Option<UserInput>,
    ) -> FlowResult<FlowOutcome> {
        self.start_flow(handler, step_id, source, user_input).await
    }

    async fn start_flow(
        &self,
        handler: &str,
        step_id: &str,
        source: FlowSource,
        user_input: Option<UserInput>,
    ) -> FlowResult<FlowOutcome> {
        let factory = self.registry.lookup(handler)?;
        let mut instance = factory();

        if !instance.has_step(step_id) {
            return Err(FlowError::UnknownStep {
                handler: handler.to_string(),
                step_id: step_id.to_string(),
            });
        }

        let flow_id = Ulid::new().to_string();
        debug!(flow_id = %flow_id, handler = %handler, step_id = %step_id, "Starting config flow");

        let result = instance.async_step(step_id, user_input).await?;
        let now = Utc::now();

        match result.next_step() {
            Some(next) => {
                ensure_step(instance.as_ref(), handler, next)?;
                let flow = ActiveFlow {
                    flow_id: flow_id.clone(),
                    handler: handler.to_string(),
                    source,
                    started_at: now,
                    state: Mutex::new(FlowState {
                        step_id: next.to_string(),
                        last_activity: now,
                        retired: false,
                        instance,
                    }),
                };
                self.flows.insert(flow_id.clone(), Arc::new(flow));
                debug!(flow_id = %flow_id, step_id = %next, "Config flow awaiting input");
            }
            None => {
                info!(
                    flow_id = %flow_id,
                    handler = %handler,
                    result = result.type_name(),
                    "Config flow finished on first step"
                );
                self.finish_entry(handler, instance.version(), source, &result)
                    .await?;
            }
        }

        Ok(FlowOutcome {
            flow_id,
            handler: handler.to_string(),
            result,
        })
    }

    /// Continue a flow with user input
    ///
    /// The input goes to the step the flow last stopped on. The flow is
    /// retired when the step finishes it.
    #[instrument(skip(self, user_input))]
    pub async fn async_configure(
        &self,
        flow_id: &str,
        user_input: Option<UserInput>,
    ) -> FlowResult<FlowOutcome> {
        let flow = self.get_flow(flow_id)?;
        let mut state = flow.state.lock().await;

        // Retired while this call was waiting for the lock
        if state.retired {
            return Err(FlowError::UnknownFlow(flow_id.to_string()));
        }

        let step_id = state.step_id.clone();
        ensure_step(state.instance.as_ref(), &flow.handler, &step_id)?;

        debug!(flow_id = %flow_id, step_id = %step_id, "Running config flow step");
        let result = state.instance.async_step(&step_id, user_input).await?;
        state.last_activity = Utc::now();

        match result.next_step() {
            Some(next) => {
                ensure_step(state.instance.as_ref(), &flow.handler, next)?;
                state.step_id = next.to_string();
                debug!(flow_id = %flow_id, step_id = %next, "Config flow awaiting input");
            }
            None => {
                state.retired = true;
                let version = state.instance.version();
                drop(state);
                self.flows.remove(flow_id);

                info!(
                    flow_id = %flow_id,
                    handler = %flow.handler,
                    result = result.type_name(),
                    "Config flow finished"
                );
                self.finish_entry(&flow.handler, version, flow.source, &result)
                    .await?;
            }
        }

        Ok(FlowOutcome {
            flow_id: flow_id.to_string(),
            handler: flow.handler.clone(),
            result,
        })
    }

    /// Abort a live flow
    ///
    /// Waits for a running step of the flow to finish first.
    #[instrument(skip(self))]
    pub async fn async_abort(&self, flow_id: &str) -> FlowResult<()> {
        let flow = self.get_flow(flow_id)?;
        let mut state = flow.state.lock().await;

        if state.retired {
            return Err(FlowError::UnknownFlow(flow_id.to_string()));
        }

        state.retired = true;
        drop(state);
        self.flows.remove(flow_id);

        info!(flow_id = %flow_id, handler = %flow.handler, "Config flow aborted");
        Ok(())
    }

    /// Snapshot of all live flows
    pub fn async_progress(&self) -> Vec<FlowProgress> {
        let flows: Vec<_> = self.flows.iter().map(|r| r.value().clone()).collect();

        flows
            .into_iter()
            .filter_map(|flow| {
                let step_id = match flow.state.try_lock() {
                    Ok(state) if state.retired => return None,
                    Ok(state) => Some(state.step_id.clone()),
                    Err(_) => None,
                };
                Some(FlowProgress {
                    flow_id: flow.flow_id.clone(),
                    handler: flow.handler.clone(),
                    step_id,
                    source: flow.source,
                    started_at: flow.started_at,
                })
            })
            .collect()
    }

    /// Check if a flow is live
    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }

    /// Number of live flows
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Check if there are no live flows
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Drop flows idle for longer than the configured TTL
    ///
    /// Flows in the middle of a step are never dropped. Returns the number of
    /// flows removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = match self.config.flow_ttl.map(chrono::Duration::from_std) {
            Some(Ok(ttl)) => ttl,
            _ => return 0,
        };

        let flows: Vec<_> = self.flows.iter().map(|r| r.value().clone()).collect();
        let mut removed = 0;

        for flow in flows {
            let Ok(mut state) = flow.state.try_lock() else {
                continue;
            };
            if state.retired || now - state.last_activity < ttl {
                continue;
            }

            state.retired = true;
            drop(state);
            self.flows.remove(&flow.flow_id);
            removed += 1;

            info!(flow_id = %flow.flow_id, handler = %flow.handler, "Expired idle config flow");
        }

        removed
    }

    fn get_flow(&self, flow_id: &str) -> FlowResult<Arc<ActiveFlow>> {
        self.flows
            .get(flow_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    /// Pass a finished entry to the sink
    async fn finish_entry(
        &self,
        handler: &str,
        version: u32,
        source: FlowSource,
        result: &StepResult,
    ) -> FlowResult<()> {
        let StepResult::CreateEntry { title, data } = result else {
            return Ok(());
        };

        let Some(ref sink) = self.entry_sink else {
            debug!(handler = %handler, "No entry sink configured, dropping entry");
            return Ok(());
        };

        sink.async_add_flow_entry(FlowEntry {
            handler: handler.to_string(),
            title: title.clone(),
            data: data.clone(),
            version,
            source,
        })
        .await
    }
}

fn ensure_step(instance: &dyn ConfigFlowHandler, handler: &str, step_id: &str) -> FlowResult<()> {
    if instance.has_step(step_id) {
        Ok(())
    } else {
        Err(FlowError::UnknownStep {
            handler: handler.to_string(),
            step_id: step_id.to_string(),
        })
    }
}

/// Periodically drop expired flows
pub fn spawn_expiry_sweep(manager: Arc<FlowManager>, interval: Duration) -> JoinHandle<()> {
    // tokio intervals must be non-zero
    let interval = interval.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        loop {
            timer.tick().await;
            let removed = manager.remove_expired(Utc::now());
            if removed > 0 {
                debug!(removed, "Config flow expiry sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataSchema, FieldType};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn input(value: serde_json::Value) -> UserInput {
        value.as_object().cloned().unwrap()
    }

    #[derive(Default)]
    struct EntryFlow;

    #[async_trait]
    impl ConfigFlowHandler for EntryFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            Ok(StepResult::create_entry(
                "T",
                input(json!({"secret": "account_token"})),
            ))
        }
    }

    #[derive(Default)]
    struct AbortFlow;

    #[async_trait]
    impl ConfigFlowHandler for AbortFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            Ok(StepResult::abort("bla"))
        }
    }

    #[derive(Default)]
    struct TwoStepFlow;

    #[async_trait]
    impl ConfigFlowHandler for TwoStepFlow {
        fn version(&self) -> u32 {
            2
        }

        fn step_ids(&self) -> &[&'static str] {
            &["init", "account", "discovery"]
        }

        async fn async_step(
            &mut self,
            step_id: &str,
            user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            match (step_id, user_input) {
                ("init", _) | ("discovery", _) => Ok(StepResult::form("account")
                    .with_title("test-title")
                    .with_schema(DataSchema::new().required("user_title", FieldType::String))),
                ("account", Some(user_input)) => {
                    let title = user_input["user_title"].as_str().unwrap_or_default();
                    Ok(StepResult::create_entry(
                        title,
                        input(json!({"secret": "account_token"})),
                    ))
                }
                ("account", None) => Ok(StepResult::form("account")),
                _ => unreachable!(),
            }
        }
    }

    /// Keeps a counter across steps
    #[derive(Default)]
    struct CounterFlow {
        count: usize,
    }

    #[async_trait]
    impl ConfigFlowHandler for CounterFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init", "count"]
        }

        async fn async_step(
            &mut self,
            step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            if step_id == "count" {
                self.count += 1;
            }
            Ok(StepResult::form("count").with_title(self.count.to_string()))
        }
    }

    #[derive(Default)]
    struct NoInitFlow;

    #[async_trait]
    impl ConfigFlowHandler for NoInitFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["account"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            Ok(StepResult::abort("unreachable"))
        }
    }

    /// Sends the flow to a step it does not implement
    #[derive(Default)]
    struct BrokenTransitionFlow;

    #[async_trait]
    impl ConfigFlowHandler for BrokenTransitionFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init", "user"]
        }

        async fn async_step(
            &mut self,
            step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            match step_id {
                "init" => Ok(StepResult::form("user")),
                _ => Ok(StepResult::form("missing")),
            }
        }
    }

    #[derive(Default)]
    struct ValidatingFlow;

    #[async_trait]
    impl ConfigFlowHandler for ValidatingFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            let schema = DataSchema::new().required("host", FieldType::String);
            match user_input {
                Some(user_input) => {
                    let data = schema.validate(&user_input)?;
                    Ok(StepResult::create_entry("Host", data))
                }
                None => Ok(StepResult::form("init").with_schema(schema)),
            }
        }
    }

    /// Records how many steps run at the same time
    struct SlowFlow {
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConfigFlowHandler for SlowFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init", "wait"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(StepResult::form("wait"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        entries: std::sync::Mutex<Vec<FlowEntry>>,
    }

    #[async_trait]
    impl EntrySink for RecordingSink {
        async fn async_add_flow_entry(&self, entry: FlowEntry) -> FlowResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EntrySink for FailingSink {
        async fn async_add_flow_entry(&self, _entry: FlowEntry) -> FlowResult<()> {
            Err(FlowError::EntryStorage("disk full".to_string()))
        }
    }

    fn create_test_manager() -> FlowManager {
        let registry = HandlerRegistry::new();
        registry.register_default::<EntryFlow>("entry").unwrap();
        registry.register_default::<AbortFlow>("abort").unwrap();
        registry.register_default::<TwoStepFlow>("two_step").unwrap();
        registry.register_default::<CounterFlow>("counter").unwrap();
        registry.register_default::<NoInitFlow>("no_init").unwrap();
        registry
            .register_default::<BrokenTransitionFlow>("broken")
            .unwrap();
        registry.register_default::<ValidatingFlow>("validating").unwrap();
        FlowManager::new(Arc::new(registry), FlowManagerConfig::default())
    }

    #[tokio::test]
    async fn test_single_step_entry() {
        let sink = Arc::new(RecordingSink::default());
        let manager = create_test_manager().with_entry_sink(sink.clone());

        let outcome = manager.async_init("entry", None).await.unwrap();
        assert_eq!(outcome.result.type_name(), "create_entry");
        assert!(matches!(
            outcome.result,
            StepResult::CreateEntry { ref title, .. } if title == "T"
        ));

        // Retired immediately
        assert!(!manager.contains(&outcome.flow_id));
        let result = manager.async_configure(&outcome.flow_id, None).await;
        assert_eq!(result, Err(FlowError::UnknownFlow(outcome.flow_id.clone())));

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handler, "entry");
        assert_eq!(entries[0].data["secret"], json!("account_token"));
        assert_eq!(entries[0].source, FlowSource::User);
    }

    #[tokio::test]
    async fn test_abort_retires_flow() {
        let manager = create_test_manager();

        let outcome = manager.async_init("abort", None).await.unwrap();

        assert_eq!(outcome.result, StepResult::abort("bla"));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_two_step_flow() {
        let sink = Arc::new(RecordingSink::default());
        let manager = create_test_manager().with_entry_sink(sink.clone());

        let outcome = manager.async_init("two_step", None).await.unwrap();
        assert_eq!(outcome.result.next_step(), Some("account"));
        assert!(manager.contains(&outcome.flow_id));

        let finished = manager
            .async_configure(
                &outcome.flow_id,
                Some(input(json!({"user_title": "user-title"}))),
            )
            .await
            .unwrap();

        assert_eq!(finished.flow_id, outcome.flow_id);
        assert!(matches!(
            finished.result,
            StepResult::CreateEntry { ref title, .. } if title == "user-title"
        ));
        assert!(manager.is_empty());
        assert_eq!(sink.entries.lock().unwrap()[0].version, 2);
    }

    #[tokio::test]
    async fn test_finished_flow_never_resumes() {
        let manager = create_test_manager();

        let outcome = manager.async_init("two_step", None).await.unwrap();
        manager
            .async_configure(&outcome.flow_id, Some(input(json!({"user_title": "x"}))))
            .await
            .unwrap();

        for _ in 0..3 {
            let result = manager
                .async_configure(&outcome.flow_id, Some(input(json!({"user_title": "x"}))))
                .await;
            assert!(matches!(result, Err(FlowError::UnknownFlow(_))));
        }
    }

    #[tokio::test]
    async fn test_unknown_handler() {
        let manager = create_test_manager();

        let result = manager.async_init("nonexistent", None).await;

        assert_eq!(
            result,
            Err(FlowError::UnknownHandler("nonexistent".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_flow() {
        let manager = create_test_manager();

        let result = manager.async_configure("01HZZZZZZZZZZZZZZZZZZZZZZZ", None).await;

        assert!(matches!(result, Err(FlowError::UnknownFlow(_))));
    }

    #[tokio::test]
    async fn test_handler_without_init() {
        let manager = create_test_manager();

        let result = manager.async_init("no_init", None).await;

        assert!(matches!(result, Err(FlowError::UnknownStep { ref step_id, .. }) if step_id == "init"));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_step_rejected() {
        let manager = create_test_manager();

        let result = manager.async_init("two_step", Some("discovery")).await;

        assert_eq!(result, Err(FlowError::ReservedStep("discovery".to_string())));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_step_reachable_internally() {
        let sink = Arc::new(RecordingSink::default());
        let manager = create_test_manager().with_entry_sink(sink.clone());

        let outcome = manager
            .async_init_at("two_step", "discovery", FlowSource::Discovery, None)
            .await
            .unwrap();
        assert_eq!(outcome.result.next_step(), Some("account"));

        manager
            .async_configure(&outcome.flow_id, Some(input(json!({"user_title": "found"}))))
            .await
            .unwrap();

        assert_eq!(sink.entries.lock().unwrap()[0].source, FlowSource::Discovery);
    }

    #[tokio::test]
    async fn test_transition_to_missing_step_keeps_flow() {
        let manager = create_test_manager();

        let outcome = manager.async_init("broken", None).await.unwrap();
        let result = manager.async_configure(&outcome.flow_id, None).await;

        assert!(matches!(result, Err(FlowError::UnknownStep { ref step_id, .. }) if step_id == "missing"));
        let progress = manager.async_progress();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].step_id.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_invalid_input_keeps_flow() {
        let manager = create_test_manager();

        let outcome = manager.async_init("validating", None).await.unwrap();
        let result = manager
            .async_configure(&outcome.flow_id, Some(input(json!({"port": 80}))))
            .await;
        assert!(matches!(result, Err(FlowError::InvalidInput(_))));
        assert!(manager.contains(&outcome.flow_id));

        let finished = manager
            .async_configure(&outcome.flow_id, Some(input(json!({"host": "tivo.local"}))))
            .await
            .unwrap();
        assert!(finished.result.is_terminal());
    }

    #[tokio::test]
    async fn test_distinct_flows_are_independent() {
        let manager = create_test_manager();

        let (a, b) = tokio::join!(
            manager.async_init("counter", None),
            manager.async_init("counter", None)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.flow_id, b.flow_id);

        manager.async_configure(&a.flow_id, None).await.unwrap();
        let a_result = manager.async_configure(&a.flow_id, None).await.unwrap();
        let b_result = manager.async_configure(&b.flow_id, None).await.unwrap();

        assert_eq!(a_result.result, StepResult::form("count").with_title("2"));
        assert_eq!(b_result.result, StepResult::form("count").with_title("1"));
    }

    #[tokio::test]
    async fn test_steps_of_one_flow_are_serialized() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let registry = HandlerRegistry::new();
        let (r, m) = (running.clone(), max_running.clone());
        registry
            .register("slow", move || {
                Box::new(SlowFlow {
                    running: r.clone(),
                    max_running: m.clone(),
                }) as Box<dyn ConfigFlowHandler>
            })
            .unwrap();
        let manager = FlowManager::new(Arc::new(registry), FlowManagerConfig::default());

        let outcome = manager.async_init("slow", None).await.unwrap();
        let (first, second) = tokio::join!(
            manager.async_configure(&outcome.flow_id, None),
            manager.async_configure(&outcome.flow_id, None)
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configure_racing_a_finished_flow() {
        let sink = Arc::new(RecordingSink::default());
        let manager = create_test_manager().with_entry_sink(sink.clone());

        let outcome = manager.async_init("two_step", None).await.unwrap();
        let user_input = input(json!({"user_title": "user-title"}));
        let (first, second) = tokio::join!(
            manager.async_configure(&outcome.flow_id, Some(user_input.clone())),
            manager.async_configure(&outcome.flow_id, Some(user_input.clone()))
        );

        let (finished, lost) = match (first, second) {
            (Ok(finished), lost) | (lost, Ok(finished)) => (finished, lost),
            (Err(a), Err(b)) => panic!("both configure calls failed: {a}, {b}"),
        };
        assert_eq!(finished.result.type_name(), "create_entry");
        assert!(matches!(lost, Err(FlowError::UnknownFlow(id)) if id == outcome.flow_id));
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_abort_flow() {
        let manager = create_test_manager();

        let outcome = manager.async_init("two_step", None).await.unwrap();
        manager.async_abort(&outcome.flow_id).await.unwrap();

        assert!(manager.is_empty());
        assert!(matches!(
            manager.async_abort(&outcome.flow_id).await,
            Err(FlowError::UnknownFlow(_))
        ));
    }

    #[tokio::test]
    async fn test_progress() {
        let manager = create_test_manager();

        let outcome = manager.async_init("two_step", None).await.unwrap();
        manager.async_init("abort", None).await.unwrap();

        let progress = manager.async_progress();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].flow_id, outcome.flow_id);
        assert_eq!(progress[0].handler, "two_step");
        assert_eq!(progress[0].step_id.as_deref(), Some("account"));
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let manager = create_test_manager();

        let outcome = manager.async_init("two_step", None).await.unwrap();

        assert_eq!(manager.remove_expired(Utc::now()), 0);
        assert_eq!(
            manager.remove_expired(Utc::now() + chrono::Duration::hours(2)),
            1
        );
        assert!(matches!(
            manager.async_configure(&outcome.flow_id, None).await,
            Err(FlowError::UnknownFlow(_))
        ));
    }

    #[tokio::test]
    async fn test_no_expiry_without_ttl() {
        let registry = HandlerRegistry::new();
        registry.register_default::<TwoStepFlow>("two_step").unwrap();
        let config = FlowManagerConfig {
            flow_ttl: None,
            ..Default::default()
        };
        let manager = FlowManager::new(Arc::new(registry), config);

        manager.async_init("two_step", None).await.unwrap();

        assert_eq!(
            manager.remove_expired(Utc::now() + chrono::Duration::days(365)),
            0
        );
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_sink_failure_still_retires_flow() {
        let manager = create_test_manager().with_entry_sink(Arc::new(FailingSink));

        let outcome = manager.async_init("two_step", None).await.unwrap();
        let result = manager
            .async_configure(&outcome.flow_id, Some(input(json!({"user_title": "x"}))))
            .await;

        assert!(matches!(result, Err(FlowError::EntryStorage(_))));
        assert!(manager.is_empty());
    }
}
