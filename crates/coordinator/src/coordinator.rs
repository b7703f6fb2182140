//! The coordinator: one request in, one aggregated response out.

use crate::aggregator::{AggregatedResponse, ResponseAggregator};
use crate::classifier::{Classification, RequestClassifier};
use crate::config::CoordinatorConfig;
use crate::context::ContextManager;
use crate::executor::WorkflowExecutor;
use crate::fallback::{FallbackCoordinator, GuidanceProvider};
use crate::plan::WorkflowPlan;
use crate::planner::WorkflowPlanner;
use concierge_agents::{default_catalog, AgentRegistry, LlmAgentInvoker, ToolGate};
use concierge_common::{
    AgentInvoker, ConciergeError, ConversationTurn, CoordinationError, Result, UserRequest,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrates classification, planning, execution and aggregation.
///
/// Shared behind an `Arc`; any number of requests may be processed concurrently.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    context: ContextManager,
    classifier: RequestClassifier,
    planner: WorkflowPlanner,
    executor: WorkflowExecutor,
    aggregator: ResponseAggregator,

    /// Cancellation handles of in-flight requests, keyed by request id
    active: Mutex<HashMap<String, (u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl Coordinator {
    /// Create a coordinator over the given registry and invoker.
    pub fn new(
        config: &CoordinatorConfig,
        registry: Arc<AgentRegistry>,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Result<Self> {
        Self::builder(config.clone())
            .registry(registry)
            .invoker(invoker)
            .build()
    }

    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Build a coordinator backed by the built-in catalog and the configured LLM.
    pub fn from_config(config: CoordinatorConfig) -> Result<Self> {
        let registry = Arc::new(AgentRegistry::new(default_catalog(), &config.general_agent)?);
        let client = concierge_llm::build_llm_client(&config.llm)?;
        let invoker = LlmAgentInvoker::new(client, Arc::clone(&registry))
            .with_sampling(config.llm.temperature, config.llm.max_tokens);

        info!(
            provider = %config.llm.provider,
            model = %config.llm.model,
            agents = registry.len(),
            "Initializing Concierge coordinator"
        );

        Self::builder(config)
            .registry(registry)
            .invoker(Arc::new(invoker))
            .build()
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Number of requests currently being processed.
    pub fn active_requests(&self) -> usize {
        self.active.lock().len()
    }

    /// Classify a request without executing it.
    pub fn classify(&self, request: &UserRequest) -> Classification {
        let snapshot = self.context.snapshot(request);
        self.classifier.classify(request, &snapshot)
    }

    /// Classify and plan a request without executing it.
    pub fn plan(&self, request: &UserRequest) -> (Classification, WorkflowPlan) {
        let classification = self.classify(request);
        let plan = self.planner.plan(request, &classification);
        (classification, plan)
    }

    /// Process a request to completion.
    ///
    /// Never fails: every failure mode ends in a (possibly degraded) response.
    pub async fn process(&self, request: UserRequest) -> AggregatedResponse {
        self.process_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Process a request that can also be aborted through `cancel`.
    pub async fn process_with_cancel(
        &self,
        request: UserRequest,
        cancel: CancellationToken,
    ) -> AggregatedResponse {
        let token = cancel.child_token();
        let _active = self.register(&request.id, token.clone());

        info!(
            request_id = %request.id,
            preview = %preview(&request.content),
            mode = ?request.mode,
            "Processing request"
        );

        let snapshot = Arc::new(self.context.snapshot(&request));
        let classification = self.classifier.classify(&request, &snapshot);
        let plan = self.planner.plan(&request, &classification);

        let mut anomalies: Vec<CoordinationError> = classification
            .anomaly
            .iter()
            .chain(plan.anomaly())
            .cloned()
            .collect();

        debug!(
            request_id = %request.id,
            workflow = %plan.name,
            phases = plan.len(),
            "Planned request"
        );

        let report = self.executor.execute(plan, snapshot, token).await;

        for phase in &report.phases {
            anomalies.extend(
                phase
                    .failures
                    .iter()
                    .map(|failure| CoordinationError::from_failure(&phase.id, failure)),
            );
        }

        let mut response =
            self.aggregator
                .aggregate(report, classification.intent, classification.complexity);
        response.request_id = request.id.clone();
        response.anomalies = anomalies.iter().map(ToString::to_string).collect();

        if response.cancelled {
            info!(request_id = %request.id, "Request cancelled, history not updated");
        } else {
            self.context.commit(
                ConversationTurn::user(&request.content),
                ConversationTurn::assistant(&response.content),
            );
        }

        info!(
            request_id = %request.id,
            workflow = %response.workflow,
            degraded = response.degraded,
            fully_degraded = response.fully_degraded,
            anomalies = response.anomalies.len(),
            "Request completed"
        );

        response
    }

    /// Cancel an in-flight request. Returns `false` if no such request is running.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.active.lock().get(request_id) {
            Some((_, token)) => {
                info!(request_id = %request_id, "Cancelling request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn register(&self, request_id: &str, token: CancellationToken) -> ActiveRequest<'_> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .active
            .lock()
            .insert(request_id.to_string(), (generation, token.clone()));
        if previous.is_some() {
            warn!(request_id = %request_id, "Request id already in flight, replacing its cancel handle");
        }
        ActiveRequest {
            active: &self.active,
            request_id: request_id.to_string(),
            generation,
            token,
        }
    }
}

/// Removes a request from the active set when processing ends or is dropped.
struct ActiveRequest<'a> {
    active: &'a Mutex<HashMap<String, (u64, CancellationToken)>>,
    request_id: String,
    generation: u64,
    token: CancellationToken,
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if active
            .get(&self.request_id)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            active.remove(&self.request_id);
        }
        // Stops phases still running if the caller dropped the request future.
        self.token.cancel();
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    registry: Option<Arc<AgentRegistry>>,
    invoker: Option<Arc<dyn AgentInvoker>>,
    guidance: Option<Arc<dyn GuidanceProvider>>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: None,
            invoker: None,
            guidance: None,
        }
    }

    pub fn registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn invoker(mut self, invoker: Arc<dyn AgentInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn guidance(mut self, guidance: Arc<dyn GuidanceProvider>) -> Self {
        self.guidance = Some(guidance);
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| ConciergeError::Config(e.to_string()))?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(AgentRegistry::new(default_catalog(), &config.general_agent)?),
        };
        if registry.general_agent_name() != config.general_agent {
            return Err(ConciergeError::Config(format!(
                "general_agent '{}' does not match the registry's general agent '{}'",
                config.general_agent,
                registry.general_agent_name()
            )));
        }

        let invoker = self
            .invoker
            .ok_or_else(|| ConciergeError::Config("An agent invoker is required".into()))?;

        let tools = Arc::new(ToolGate::from_registry(&registry, &config.tools));
        let mut fallback =
            FallbackCoordinator::new(Arc::clone(&registry), config.backups.clone(), Arc::clone(&tools));
        if let Some(guidance) = self.guidance {
            fallback = fallback.with_guidance(guidance);
        }

        Ok(Coordinator {
            context: ContextManager::new(
                config.history_cap,
                config.preferences.clone(),
                config.workspace_root.clone(),
            ),
            classifier: RequestClassifier::new(
                Arc::clone(&registry),
                config.indicator_phrases.clone(),
                config.coverage_threshold,
            ),
            planner: WorkflowPlanner::new(Arc::clone(&registry)),
            executor: WorkflowExecutor::new(
                invoker,
                Arc::new(fallback),
                tools,
                config.phase_timeout(),
            ),
            aggregator: ResponseAggregator::new(),
            registry,
            active: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 80;
    match content.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}
