use serde::{Deserialize, Serialize};

use super::{FlowId, FlowOptions, PendingPrompt};

/// One activation of a flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogFrame {
    /// Flow being run
    pub flow_id: FlowId,
    /// Step to run next, or the step waiting on `pending`
    pub step_index: usize,
    /// Options and locals
    #[serde(default)]
    pub options: FlowOptions,
    /// Question waiting for an answer
    #[serde(default)]
    pub pending: Option<PendingPrompt>,
    /// Question answered this turn, kept so a failed validation can re-ask it
    #[serde(default, skip_serializing)]
    pub last_prompt: Option<PendingPrompt>,
}

impl DialogFrame {
    /// Fresh frame at step 0
    #[must_use]
    pub fn new(flow_id: FlowId, options: FlowOptions) -> Self {
        Self {
            flow_id,
            step_index: 0,
            options,
            pending: None,
            last_prompt: None,
        }
    }
}

/// LIFO stack of frames; empty means the conversation is idle
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogStack {
    frames: Vec<DialogFrame>,
}

impl DialogStack {
    /// Empty stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame on top
    pub fn push(&mut self, frame: DialogFrame) {
        self.frames.push(frame);
    }

    /// Pop the top frame; `None` when already empty
    pub fn pop(&mut self) -> Option<DialogFrame> {
        self.frames.pop()
    }

    /// Active frame
    #[must_use]
    pub fn top(&self) -> Option<&DialogFrame> {
        self.frames.last()
    }

    /// Active frame, mutably
    pub fn top_mut(&mut self) -> Option<&mut DialogFrame> {
        self.frames.last_mut()
    }

    /// Bottom frame: the top-level task
    #[must_use]
    pub fn root(&self) -> Option<&DialogFrame> {
        self.frames.first()
    }

    /// Number of frames
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the conversation is idle
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Frames from bottom to top
    pub fn frames(&self) -> impl Iterator<Item = &DialogFrame> {
        self.frames.iter()
    }

    /// Whether any frame runs `flow`
    #[must_use]
    pub fn contains(&self, flow: &FlowId) -> bool {
        self.frames.iter().any(|f| &f.flow_id == flow)
    }
}
