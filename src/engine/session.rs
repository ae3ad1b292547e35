//! Execution sessions
//!
//! One record per submitted request: the request, the route it was given,
//! and a dedicated executor that runs on a spawned task. Records live in
//! process memory only; past the retention cap the oldest finished records
//! are dropped on submit.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::amount::parse_units;
use super::attested_transfer::{AttestedTransferExecutor, AttestedTransferParams};
use super::bridge_executor::{BridgeExecutor, BridgeParams};
use super::router::{Route, SwapRequest};
use super::state::{Evidence, ExecutionState};
use super::swap_executor::{DirectSwapExecutor, DirectSwapParams};
use super::{unix_now, EngineContext};
use crate::types::{EngineError, EngineResult};

/// Records kept before finished ones are pruned
pub const DEFAULT_MAX_EXECUTIONS: usize = 1000;

/// Executor chosen for a request, with the parameters it runs with
enum RouteExecutor {
    Direct(DirectSwapExecutor, DirectSwapParams),
    Attested(AttestedTransferExecutor, AttestedTransferParams),
    Bridge(BridgeExecutor, BridgeParams),
}

impl RouteExecutor {
    fn new(route: Route, request: &SwapRequest, ctx: &EngineContext) -> EngineResult<Self> {
        let slippage_bps = ctx.settings.slippage_bps;
        Ok(match route {
            Route::DirectSwap => RouteExecutor::Direct(
                DirectSwapExecutor::new(ctx.clone()),
                DirectSwapParams::from_request(request, slippage_bps)?,
            ),
            Route::AttestedTransfer => RouteExecutor::Attested(
                AttestedTransferExecutor::new(ctx.clone()),
                AttestedTransferParams::from_request(request, slippage_bps)?,
            ),
            Route::BridgeAggregator => RouteExecutor::Bridge(
                BridgeExecutor::new(ctx.clone()),
                BridgeParams::from_request(request),
            ),
        })
    }

    async fn run(&self) -> EngineResult<Evidence> {
        match self {
            RouteExecutor::Direct(exec, params) => exec.swap(params.clone()).await,
            RouteExecutor::Attested(exec, params) => exec.sign(params.clone()).await,
            RouteExecutor::Bridge(exec, params) => exec.swap(params.clone()).await,
        }
    }

    fn state(&self) -> ExecutionState {
        match self {
            RouteExecutor::Direct(exec, _) => exec.state(),
            RouteExecutor::Attested(exec, _) => exec.state(),
            RouteExecutor::Bridge(exec, _) => exec.state(),
        }
    }

    fn subscribe(&self) -> tokio::sync::watch::Receiver<ExecutionState> {
        match self {
            RouteExecutor::Direct(exec, _) => exec.subscribe(),
            RouteExecutor::Attested(exec, _) => exec.subscribe(),
            RouteExecutor::Bridge(exec, _) => exec.subscribe(),
        }
    }

    fn details(&self) -> Value {
        let details = match self {
            RouteExecutor::Direct(exec, _) => serde_json::to_value(exec.transient()),
            RouteExecutor::Attested(exec, _) => serde_json::to_value(exec.transient()),
            RouteExecutor::Bridge(exec, _) => serde_json::to_value(exec.transient()),
        };
        details.unwrap_or(Value::Null)
    }

    fn reset(&self) {
        match self {
            RouteExecutor::Direct(exec, _) => exec.reset(),
            RouteExecutor::Attested(exec, _) => exec.reset(),
            RouteExecutor::Bridge(exec, _) => exec.reset(),
        }
    }
}

/// A submitted request and its executor
pub struct Execution {
    pub id: String,
    pub request: SwapRequest,
    pub route: Route,
    pub created_at: u64,
    executor: RouteExecutor,
}

impl Execution {
    pub fn state(&self) -> ExecutionState {
        self.executor.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ExecutionState> {
        self.executor.subscribe()
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: self.id.clone(),
            route: self.route,
            request: self.request.clone(),
            created_at: self.created_at,
            state: self.executor.state(),
            details: self.executor.details(),
        }
    }
}

/// Point-in-time view of an execution, as served over HTTP
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub id: String,
    pub route: Route,
    pub request: SwapRequest,
    pub created_at: u64,
    pub state: ExecutionState,
    /// Transient fields of the current run (signature, quote, hashes)
    pub details: Value,
}

pub struct ExecutionManager {
    ctx: EngineContext,
    executions: RwLock<HashMap<String, Arc<Execution>>>,
    max_executions: usize,
}

impl ExecutionManager {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            executions: RwLock::new(HashMap::new()),
            max_executions: DEFAULT_MAX_EXECUTIONS,
        }
    }

    /// Retention cap. Only Success and Error records are ever dropped, so
    /// the map can exceed the cap while that many runs are in flight.
    pub fn with_max_executions(mut self, max: usize) -> Self {
        self.max_executions = max.max(1);
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Validate, classify and start a request on a background task.
    /// Fails fast without creating a record when the request is malformed.
    pub async fn submit(&self, request: SwapRequest) -> EngineResult<ExecutionSnapshot> {
        self.validate(&request)?;
        let route = self.ctx.router.classify_request(&request);
        let executor = RouteExecutor::new(route, &request, &self.ctx)?;

        let execution = Arc::new(Execution {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            route,
            created_at: unix_now(),
            executor,
        });
        tracing::info!(
            id = %execution.id,
            route = %route,
            source = %execution.request.source_chain,
            dest = %execution.request.dest_chain,
            amount = %execution.request.amount,
            "execution submitted"
        );

        {
            let mut executions = self.executions.write().await;
            prune_finished(&mut executions, self.max_executions - 1);
            executions.insert(execution.id.clone(), execution.clone());
        }
        let snapshot = execution.snapshot();
        spawn_run(execution);
        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> EngineResult<Arc<Execution>> {
        self.executions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", id)))
    }

    /// All executions, oldest first
    pub async fn list(&self) -> Vec<ExecutionSnapshot> {
        let mut snapshots: Vec<ExecutionSnapshot> = self
            .executions
            .read()
            .await
            .values()
            .map(|e| e.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Back to Idle. A step still in flight keeps running; its result is
    /// discarded.
    pub async fn reset(&self, id: &str) -> EngineResult<ExecutionSnapshot> {
        let execution = self.get(id).await?;
        execution.executor.reset();
        tracing::info!(id = %id, "execution reset");
        Ok(execution.snapshot())
    }

    /// Reset and run the stored request again. Only a finished (or reset)
    /// execution can be retried; one with a step in flight is `Busy`.
    pub async fn retry(&self, id: &str) -> EngineResult<ExecutionSnapshot> {
        let execution = self.get(id).await?;
        let state = execution.state();
        if !(state.is_terminal() || state.is_idle()) {
            return Err(EngineError::Busy(format!(
                "execution {} is {}; reset it or wait for it to finish",
                id,
                state.name()
            )));
        }
        execution.executor.reset();
        tracing::info!(id = %id, "execution retried");
        let snapshot = execution.snapshot();
        spawn_run(execution);
        Ok(snapshot)
    }

    /// Wait until the execution reaches Success or Error. Never returns for
    /// an execution that was reset and not retried.
    pub async fn wait_terminal(&self, id: &str) -> EngineResult<ExecutionState> {
        let execution = self.get(id).await?;
        let mut rx = execution.subscribe();
        let state = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| EngineError::NotFound(format!("execution {} was dropped", id)))?;
        Ok(state.clone())
    }

    fn validate(&self, request: &SwapRequest) -> EngineResult<()> {
        parse_units(&request.amount, request.source_asset.decimals())?;
        if let Some(connected) = self.ctx.wallet.address() {
            if connected != request.depositor {
                return Err(EngineError::InvalidAddress(format!(
                    "depositor {} is not the connected account {}",
                    request.depositor, connected
                )));
            }
        }
        Ok(())
    }
}

/// Drop the oldest Success/Error records until at most `keep` remain
fn prune_finished(executions: &mut HashMap<String, Arc<Execution>>, keep: usize) {
    if executions.len() <= keep {
        return;
    }
    let mut finished: Vec<(u64, String)> = executions
        .values()
        .filter(|e| e.state().is_terminal())
        .map(|e| (e.created_at, e.id.clone()))
        .collect();
    finished.sort();

    let excess = executions.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        executions.remove(&id);
        tracing::debug!(id = %id, "pruned finished execution");
    }
}

fn spawn_run(execution: Arc<Execution>) {
    tokio::spawn(async move {
        match execution.executor.run().await {
            Ok(evidence) => tracing::info!(
                id = %execution.id,
                tx = %evidence.tx_hash,
                url = %evidence.explorer_url,
                "execution settled"
            ),
            Err(EngineError::Superseded) => {
                tracing::debug!(id = %execution.id, "execution result discarded after reset")
            }
            Err(err) => tracing::warn!(id = %execution.id, error = %err, "execution failed"),
        }
    });
}
