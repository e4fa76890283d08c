use serde::Serialize;

use super::StreamMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Starting,
    Streaming,
    Continuing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// First chunk received
    Started,
    /// Segment ended on an output-length ceiling
    Truncated,
    /// Continuation stream opened
    Resumed,
    Finished,
    Failed,
}

impl StreamState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Transition table. `None` means the event is not valid in this state.
    pub const fn next(self, event: StreamEvent) -> Option<Self> {
        use StreamEvent as E;
        use StreamState as S;
        match (self, event) {
            (S::Starting, E::Started) | (S::Continuing, E::Resumed) => Some(S::Streaming),
            (S::Streaming, E::Started) => Some(S::Streaming),
            (S::Streaming, E::Truncated) => Some(S::Continuing),
            (S::Starting | S::Streaming | S::Continuing, E::Finished) => Some(S::Completed),
            (S::Starting | S::Streaming | S::Continuing, E::Failed) => Some(S::Failed),
            _ => None,
        }
    }
}

/// Per-response bookkeeping.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub mode: StreamMode,
    pub state: StreamState,
    /// Visible text delivered to the caller so far
    pub accumulated_text: String,
    /// Char offset into the response where the next delivered text starts
    pub last_emitted_offset: usize,
    pub continuation_count: u32,
}

impl StreamSession {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            state: StreamState::Starting,
            accumulated_text: String::new(),
            last_emitted_offset: 0,
            continuation_count: 0,
        }
    }

    /// Record visible text released to the caller.
    pub fn record_emitted(&mut self, text: &str) {
        self.accumulated_text.push_str(text);
        self.last_emitted_offset += text.chars().count();
    }

    /// Apply `event`; invalid events leave the state unchanged and return false.
    pub fn advance(&mut self, event: StreamEvent) -> bool {
        match self.state.next(event) {
            Some(next) => {
                self.state = next;
                true
            },
            None => {
                tracing::debug!("[Stream] Ignoring {:?} in state {:?}", event, self.state);
                false
            },
        }
    }
}
