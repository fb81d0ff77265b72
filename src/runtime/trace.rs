use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::tool::ToolInput;

/// Tool invocation recorded in a trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Tool name as chosen (may be unknown to the registry).
    pub tool: String,
    /// Input the tool was called with.
    pub input: ToolInput,
}

/// One reasoning cycle of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    /// Zero-based cycle number.
    pub step_index: usize,
    /// Reasoning text (or step description for compiled programs).
    pub thought: String,
    /// Tool invocation, when the cycle acted.
    pub action: Option<ActionRecord>,
    /// Tool result, error text, or rendered step outcome.
    pub observation: Option<String>,
    /// When the cycle was recorded.
    pub timestamp: DateTime<Utc>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A final answer was produced.
    Finished,
    /// An engine-level error ended the run.
    Failed,
    /// The cycle budget ran out.
    MaxStepsExceeded,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// `true` only when status is [`RunStatus::Finished`].
    pub success: bool,
    /// Final answer (empty when the run did not finish).
    pub final_answer: String,
    /// Full trace, in order.
    pub steps: Vec<ReActStep>,
    /// Diagnostics: absorbed tool failures and the failure reason, if any.
    pub errors: Vec<String>,
    /// Terminal state.
    pub status: RunStatus,
    /// Shared memory as it stood when the run ended.
    #[serde(default)]
    pub memory: BTreeMap<String, Value>,
}

impl RunResult {
    /// Number of reasoning cycles executed.
    pub fn cycles(&self) -> usize {
        self.steps.len()
    }

    /// Tools invoked, in order.
    pub fn tools_called(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.action.as_ref().map(|action| action.tool.as_str()))
            .collect()
    }
}
