//! Scripted stand-ins for the external tools.
//!
//! Each operation pops the next scripted response from its queue; an empty
//! queue answers [`ToolResult::Success`]. Every invocation is recorded so
//! tests can assert on call order and count.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use hangar_proto::{ConfigTool, InfraTool, ToolContext, ToolError, ToolResult};

type Responses = Mutex<VecDeque<Result<ToolResult, ToolError>>>;

fn pop(queue: &Responses) -> Result<ToolResult, ToolError> {
    queue
        .lock()
        .pop_front()
        .unwrap_or(Ok(ToolResult::Success))
}

/// Scripted [`InfraTool`].
#[derive(Debug, Default)]
pub struct ScriptedInfraTool {
    init: Responses,
    plan: Responses,
    apply: Responses,
    destroy: Responses,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInfraTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_init(self, responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>) -> Self {
        *self.init.lock() = responses.into_iter().collect();
        self
    }

    pub fn script_plan(self, responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>) -> Self {
        *self.plan.lock() = responses.into_iter().collect();
        self
    }

    pub fn script_apply(self, responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>) -> Self {
        *self.apply.lock() = responses.into_iter().collect();
        self
    }

    pub fn script_destroy(self, responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>) -> Self {
        *self.destroy.lock() = responses.into_iter().collect();
        self
    }

    /// Operation names in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| *call == operation)
            .count()
    }
}

#[async_trait]
impl InfraTool for ScriptedInfraTool {
    async fn init(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("init".to_string());
        pop(&self.init)
    }

    async fn plan(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("plan".to_string());
        pop(&self.plan)
    }

    async fn apply(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("apply".to_string());
        pop(&self.apply)
    }

    async fn destroy(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("destroy".to_string());
        pop(&self.destroy)
    }
}

/// Scripted [`ConfigTool`].
#[derive(Debug, Default)]
pub struct ScriptedConfigTool {
    provision: Responses,
    deprovision: Responses,
    calls: Mutex<Vec<String>>,
}

impl ScriptedConfigTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_provision(
        self,
        responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>,
    ) -> Self {
        *self.provision.lock() = responses.into_iter().collect();
        self
    }

    pub fn script_deprovision(
        self,
        responses: impl IntoIterator<Item = Result<ToolResult, ToolError>>,
    ) -> Self {
        *self.deprovision.lock() = responses.into_iter().collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| *call == operation)
            .count()
    }
}

#[async_trait]
impl ConfigTool for ScriptedConfigTool {
    async fn provision(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("provision".to_string());
        pop(&self.provision)
    }

    async fn deprovision(&self, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push("deprovision".to_string());
        pop(&self.deprovision)
    }
}

/// `n` retryable failures, for scripting retry exhaustion.
pub fn errors(n: usize) -> Vec<Result<ToolResult, ToolError>> {
    (0..n).map(|_| Ok(ToolResult::Error)).collect()
}
