//! Task-scoped execution context.
//!
//! A (workflow, stage, request id) triple readable by any code running
//! within the current unit of concurrency, without explicit parameter
//! threading. The cost ledger reads it to attribute charges; the
//! orchestrator writes it on entry to a run and to each stage.
//!
//! The storage is a `tokio::task_local!` established by [`scope`]. The
//! scoped value follows the *future*, not the OS thread, so sibling batch
//! runs polled concurrently never observe each other's values. Each
//! `set_*` call swaps a new value in and returns a [`ContextGuard`] that
//! restores the prior value on drop — error paths included. Guards nest.
//!
//! Outside any scope, reads return the `"unknown"` sentinel and writes are
//! no-ops.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

/// Sentinel for an unset context slot.
pub const UNKNOWN: &str = "unknown";

tokio::task_local! {
    static CONTEXT: RefCell<ContextValues>;
}

/// Snapshot of the three context slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextValues {
    /// Workflow (pipeline) name.
    pub workflow: String,
    /// Currently executing stage name.
    pub stage: String,
    /// Request/run identifier.
    pub request_id: String,
}

impl Default for ContextValues {
    fn default() -> Self {
        Self {
            workflow: UNKNOWN.to_string(),
            stage: UNKNOWN.to_string(),
            request_id: UNKNOWN.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Workflow,
    Stage,
    RequestId,
}

fn slot_mut(values: &mut ContextValues, slot: Slot) -> &mut String {
    match slot {
        Slot::Workflow => &mut values.workflow,
        Slot::Stage => &mut values.stage,
        Slot::RequestId => &mut values.request_id,
    }
}

/// Restores the previous value of one context slot on drop.
///
/// Returned by [`set_workflow`], [`set_stage`], and [`set_request_id`].
/// Hold it for exactly the extent the new value should be visible.
#[must_use = "dropping the guard immediately restores the previous value"]
#[derive(Debug)]
pub struct ContextGuard {
    slot: Slot,
    /// Previous value; `None` when the set happened outside a scope.
    prev: Option<String>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            let _ = CONTEXT.try_with(|ctx| {
                *slot_mut(&mut ctx.borrow_mut(), self.slot) = prev;
            });
        }
    }
}

fn set_slot(slot: Slot, value: String) -> ContextGuard {
    let prev = CONTEXT
        .try_with(|ctx| std::mem::replace(slot_mut(&mut ctx.borrow_mut(), slot), value))
        .ok();
    ContextGuard { slot, prev }
}

/// Establish a fresh context (all slots `"unknown"`) for the given future.
///
/// The orchestrator wraps every run in one of these; nested scopes shadow
/// the outer context entirely.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    CONTEXT.scope(RefCell::new(ContextValues::default()), fut).await
}

/// Set the workflow slot, returning a guard that restores the prior value.
pub fn set_workflow(value: impl Into<String>) -> ContextGuard {
    set_slot(Slot::Workflow, value.into())
}

/// Set the stage slot, returning a guard that restores the prior value.
pub fn set_stage(value: impl Into<String>) -> ContextGuard {
    set_slot(Slot::Stage, value.into())
}

/// Set the request-id slot, returning a guard that restores the prior value.
pub fn set_request_id(value: impl Into<String>) -> ContextGuard {
    set_slot(Slot::RequestId, value.into())
}

/// Snapshot the current context. Outside a scope, all slots are `"unknown"`.
pub fn current() -> ContextValues {
    CONTEXT.try_with(|ctx| ctx.borrow().clone()).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn outside_scope_reads_sentinel_and_writes_are_noops() {
        let _guard = set_workflow("ghost");
        assert_eq!(current().workflow, UNKNOWN);
    }

    #[tokio::test]
    async fn set_and_restore_on_drop() {
        scope(async {
            assert_eq!(current().workflow, UNKNOWN);
            {
                let _guard = set_workflow("recommendation");
                assert_eq!(current().workflow, "recommendation");
            }
            assert_eq!(current().workflow, UNKNOWN);
        })
        .await;
    }

    #[tokio::test]
    async fn guards_nest_and_unwind_in_order() {
        scope(async {
            let _outer = set_stage("profiler");
            {
                let _inner = set_stage("matcher");
                assert_eq!(current().stage, "matcher");
            }
            assert_eq!(current().stage, "profiler");
        })
        .await;
    }

    #[tokio::test]
    async fn guard_restores_on_early_exit() {
        scope(async {
            let attempt = || -> Result<(), ()> {
                let _guard = set_request_id("run-1");
                Err(())
            };
            assert!(attempt().is_err());
            assert_eq!(current().request_id, UNKNOWN);
        })
        .await;
    }

    #[tokio::test]
    async fn slots_are_independent() {
        scope(async {
            let _wf = set_workflow("analysis");
            let _req = set_request_id("run-9");
            let snapshot = current();
            assert_eq!(snapshot.workflow, "analysis");
            assert_eq!(snapshot.request_id, "run-9");
            assert_eq!(snapshot.stage, UNKNOWN);
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_scopes_are_isolated() {
        // Two sibling futures polled concurrently in the same task must
        // never observe each other's workflow tag.
        let probe = |name: &'static str| {
            scope(async move {
                let _guard = set_workflow(name);
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    assert_eq!(current().workflow, name);
                }
            })
        };
        tokio::join!(probe("alpha"), probe("beta"));
    }

    #[tokio::test]
    async fn nested_scope_shadows_outer() {
        scope(async {
            let _outer = set_workflow("outer");
            scope(async {
                assert_eq!(current().workflow, UNKNOWN);
            })
            .await;
            assert_eq!(current().workflow, "outer");
        })
        .await;
    }
}
