//! Fan-out/fan-in over the selected analysts.
//!
//! Every branch runs on its own tokio task with its own copy of the state, so a branch only
//! ever sees its own tool loop. The canonical state is touched once, after every branch has
//! reached its clear step, by merging the branch updates in role order. The first branch to
//! fail aborts its siblings and its error becomes the run's error.

use crate::deliberation::capability::CapabilityNode;
use crate::deliberation::context::RunContext;
use crate::deliberation::error::PipelineError;
use crate::deliberation::event::PipelineEvent;
use crate::deliberation::graph::{NodeId, PipelineGraph};
use crate::deliberation::roles::AnalystRole;
use crate::deliberation::state::{PipelineState, StateUpdate};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Run one analyst from its first invocation through its clear step.
async fn run_branch(
    graph: Arc<PipelineGraph>,
    node: Arc<CapabilityNode>,
    mut state: PipelineState,
    ctx: Arc<RunContext>,
) -> Result<Vec<StateUpdate>, PipelineError> {
    let role = node.role();
    let mut current = NodeId::Analyst(role);
    let mut updates = Vec::new();

    loop {
        ctx.enter(&current.to_string()).await?;
        let update = match current {
            NodeId::Analyst(_) => node.invoke(&state, &ctx).await?,
            NodeId::Tools(_) => node.execute_tools(&state, &ctx).await,
            NodeId::Clear(_) => node.clear(),
            other => {
                return Err(PipelineError::ExecutionFailed(format!(
                    "{} is not part of the {} branch",
                    other, role
                )))
            }
        };
        state.merge(update.clone());
        updates.push(update);

        if let NodeId::Clear(_) = current {
            log::debug!("{} branch finished after {} steps", role, updates.len());
            return Ok(updates);
        }
        current = graph.next(&current, &state)?;
    }
}

/// Run every analyst branch and merge the results. Returns the collector's successor.
pub async fn fan_out(
    graph: &Arc<PipelineGraph>,
    analysts: &BTreeMap<AnalystRole, Arc<CapabilityNode>>,
    state: &mut PipelineState,
    ctx: &Arc<RunContext>,
) -> Result<NodeId, PipelineError> {
    let mut branch_nodes = Vec::new();
    for target in graph.fan_out_targets() {
        let role = match target {
            NodeId::Analyst(role) => role,
            other => {
                return Err(PipelineError::ExecutionFailed(format!(
                    "fan-out target {} is not an analyst",
                    other
                )))
            }
        };
        let node = analysts.get(&role).cloned().ok_or_else(|| {
            PipelineError::ExecutionFailed(format!("no capability node for {}", role))
        })?;
        branch_nodes.push((role, node));
    }

    let mut running = FuturesUnordered::new();
    let mut abort_handles = Vec::with_capacity(branch_nodes.len());
    for (index, (role, node)) in branch_nodes.into_iter().enumerate() {
        let handle = tokio::spawn(run_branch(
            Arc::clone(graph),
            node,
            state.clone(),
            Arc::clone(ctx),
        ));
        abort_handles.push(handle.abort_handle());
        running.push(async move { (index, role, handle.await) });
    }
    log::info!("started {} analyst branches", abort_handles.len());

    // Branches are joined as they finish so the first failure ends the run immediately.
    let mut branches: Vec<Option<Vec<StateUpdate>>> =
        abort_handles.iter().map(|_| None).collect();
    while let Some((index, role, joined)) = running.next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(e) => Err(PipelineError::ExecutionFailed(format!(
                "{} branch did not complete: {}",
                role, e
            ))),
        };
        match outcome {
            Ok(updates) => branches[index] = Some(updates),
            Err(e) => {
                log::warn!("{} branch failed, stopping the remaining analysts", role);
                for handle in &abort_handles {
                    handle.abort();
                }
                return Err(e);
            }
        }
    }

    for updates in branches.into_iter().flatten() {
        for update in updates {
            state.merge(update);
        }
    }

    ctx.enter(&NodeId::Collector.to_string()).await?;
    let roles: Vec<String> = graph.roles().iter().map(|r| r.key().to_string()).collect();
    log::info!("all analysts reported: {}", roles.join(", "));
    ctx.emit(PipelineEvent::BarrierReleased {
        run_id: ctx.run_id,
        roles,
    })
    .await;

    graph.next(&NodeId::Collector, state)
}
