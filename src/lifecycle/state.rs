//! Lifecycle states of a single request.

use std::fmt;

/// Event published before the chain runs.
pub const EVENT_BEFORE_REQUEST: &str = "application.before_request";

/// Event published after the response was produced.
pub const EVENT_AFTER_REQUEST: &str = "application.after_request";

/// Where the controller is within the current request.
///
/// `Begin → Init → BeforeRequest → HandlingRequest → AfterRequest → End`;
/// a failure jumps from any state to the error handler and then `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Begin,
    Init,
    BeforeRequest,
    HandlingRequest,
    AfterRequest,
    End,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Begin => "begin",
            LifecycleState::Init => "init",
            LifecycleState::BeforeRequest => "before_request",
            LifecycleState::HandlingRequest => "handling_request",
            LifecycleState::AfterRequest => "after_request",
            LifecycleState::End => "end",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
