//! Reassembly of streamed fragments into text and tool invocations.

use pclient::{CompletionFragment, FinishReason};

/// One tool call being reconstructed from streaming deltas. Lives only
/// for the request/response cycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub invocation_id: String,
    pub name: String,
    pub arguments: String,
}

/// What a single absorbed fragment changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerSignal {
    TextDelta { delta: String },
    ToolCallDelta { index: usize, opened: bool },
}

/// Accumulates fragments of one completion into cumulative text, an
/// ordered invocation list, and the finish reason.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    text: String,
    invocations: Vec<ToolInvocation>,
    finish: Option<FinishReason>,
    next_synthetic_id: usize,
}

impl FragmentAssembler {
    /// `first_call_ordinal` seeds the counter used to synthesize ids
    /// for tool calls the endpoint sent without one, keeping synthetic
    /// ids unique across the cycles of a turn.
    pub fn new(first_call_ordinal: usize) -> Self {
        Self {
            next_synthetic_id: first_call_ordinal,
            ..Self::default()
        }
    }

    /// Seeds the cumulative text, used when a continuation picks up
    /// after a length-truncated cycle.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn absorb(&mut self, fragment: &CompletionFragment) -> Vec<AssemblerSignal> {
        let mut signals = Vec::new();

        if let Some(delta) = &fragment.text
            && !delta.is_empty()
        {
            self.text.push_str(delta);
            signals.push(AssemblerSignal::TextDelta {
                delta: delta.clone(),
            });
        }

        if let Some(call) = &fragment.tool_call {
            let opens = call.name.as_deref().is_some_and(|name| !name.is_empty());

            if opens {
                let invocation_id = match call.id.clone().filter(|id| !id.is_empty()) {
                    Some(id) => id,
                    None => {
                        let id = format!("call_{}", self.next_synthetic_id);
                        self.next_synthetic_id += 1;
                        id
                    }
                };

                self.invocations.push(ToolInvocation {
                    invocation_id,
                    name: call.name.clone().unwrap_or_default(),
                    arguments: call.arguments.clone().unwrap_or_default(),
                });
                signals.push(AssemblerSignal::ToolCallDelta {
                    index: self.invocations.len() - 1,
                    opened: true,
                });
            } else if let Some(arguments) = &call.arguments
                && let Some(last) = self.invocations.last_mut()
            {
                last.arguments.push_str(arguments);
                signals.push(AssemblerSignal::ToolCallDelta {
                    index: self.invocations.len() - 1,
                    opened: false,
                });
            }
        }

        if let Some(reason) = &fragment.finish {
            self.finish = Some(reason.clone());
        }

        signals
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn invocation(&self, index: usize) -> Option<&ToolInvocation> {
        self.invocations.get(index)
    }

    pub fn finish(&self) -> Option<&FinishReason> {
        self.finish.as_ref()
    }
}
