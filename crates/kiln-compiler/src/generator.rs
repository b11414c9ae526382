//! Generator state machine model
//!
//! A suspendable function is lowered into a factory and a machine. The machine is
//! driven by `(action, value)` pairs and keeps its progress in a state field. This
//! module defines that state field, its integer encoding in the IR, and the total
//! transition function the machine's dispatch code is generated from.

use crate::ir::ErrorKind;
use serde::Serialize;
use std::fmt;

/// Persistent state of a generator or async machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeneratorState {
    /// Allocated by the factory; parameters not yet bound
    Created,
    /// Prologue done; body not entered
    SuspendedStart,
    /// Suspended at yield/await point `k`
    SuspendedYield(u32),
    Executing,
    Completed,
}

impl GeneratorState {
    const YIELD_BASE: u32 = 4;

    /// Integer stored in the generator's state field
    pub fn encode(self) -> u32 {
        match self {
            GeneratorState::Created => 0,
            GeneratorState::SuspendedStart => 1,
            GeneratorState::Executing => 2,
            GeneratorState::Completed => 3,
            GeneratorState::SuspendedYield(k) => Self::YIELD_BASE + k,
        }
    }

    pub fn decode(raw: u32) -> Self {
        match raw {
            0 => GeneratorState::Created,
            1 => GeneratorState::SuspendedStart,
            2 => GeneratorState::Executing,
            3 => GeneratorState::Completed,
            k => GeneratorState::SuspendedYield(k - Self::YIELD_BASE),
        }
    }
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorState::Created => write!(f, "created"),
            GeneratorState::SuspendedStart => write!(f, "suspended-start"),
            GeneratorState::SuspendedYield(k) => write!(f, "suspended-yield({})", k),
            GeneratorState::Executing => write!(f, "executing"),
            GeneratorState::Completed => write!(f, "completed"),
        }
    }
}

/// How the machine is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResumeAction {
    Next,
    Throw,
    Return,
}

impl ResumeAction {
    pub const ALL: [ResumeAction; 3] = [ResumeAction::Next, ResumeAction::Throw, ResumeAction::Return];

    /// Value of the machine's `action` parameter
    pub fn encode(self) -> i32 {
        match self {
            ResumeAction::Next => 0,
            ResumeAction::Throw => 1,
            ResumeAction::Return => 2,
        }
    }

    pub fn decode(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ResumeAction::Next),
            1 => Some(ResumeAction::Throw),
            2 => Some(ResumeAction::Return),
            _ => None,
        }
    }
}

impl fmt::Display for ResumeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeAction::Next => write!(f, "next"),
            ResumeAction::Throw => write!(f, "throw"),
            ResumeAction::Return => write!(f, "return"),
        }
    }
}

/// How a finishing transition completes the drive call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Finish {
    /// `{ value: undefined, done: true }`
    Done,
    /// Rethrow the driven value
    Throw,
    /// `{ value, done: true }` with the driven value
    Return,
}

/// Outcome of driving a machine in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    /// Bind parameters, then suspend at the start
    RunPrologue,
    /// Start executing the body
    EnterBody,
    /// Continue from suspension point `point`
    Resume { point: u32, action: ResumeAction },
    /// Mark the machine completed and finish the call
    Finish(Finish),
    /// Raise a runtime error without changing state
    Fail {
        kind: ErrorKind,
        message: &'static str,
    },
}

impl Transition {
    /// State stored before control leaves the dispatch code
    pub fn next_state(&self, current: GeneratorState) -> GeneratorState {
        match self {
            Transition::RunPrologue => GeneratorState::SuspendedStart,
            Transition::EnterBody | Transition::Resume { .. } => GeneratorState::Executing,
            Transition::Finish(_) => GeneratorState::Completed,
            Transition::Fail { .. } => current,
        }
    }
}

pub const ALREADY_RUNNING: &str = "Generator is already running";
pub const NOT_STARTED: &str = "Generator has not been started";

/// The machine's behavior for every (state, action) pair
pub fn transition(state: GeneratorState, action: ResumeAction) -> Transition {
    use GeneratorState::*;
    match (state, action) {
        (Executing, _) => Transition::Fail {
            kind: ErrorKind::TypeError,
            message: ALREADY_RUNNING,
        },
        (Created, ResumeAction::Next) => Transition::RunPrologue,
        (Created, _) => Transition::Fail {
            kind: ErrorKind::TypeError,
            message: NOT_STARTED,
        },
        (SuspendedStart, ResumeAction::Next) => Transition::EnterBody,
        (SuspendedStart, ResumeAction::Throw) | (Completed, ResumeAction::Throw) => {
            Transition::Finish(Finish::Throw)
        }
        (SuspendedStart, ResumeAction::Return) | (Completed, ResumeAction::Return) => {
            Transition::Finish(Finish::Return)
        }
        (SuspendedYield(point), action) => Transition::Resume { point, action },
        (Completed, ResumeAction::Next) => Transition::Finish(Finish::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_encoding_round_trips() {
        for state in [
            GeneratorState::Created,
            GeneratorState::SuspendedStart,
            GeneratorState::Executing,
            GeneratorState::Completed,
            GeneratorState::SuspendedYield(0),
            GeneratorState::SuspendedYield(7),
        ] {
            assert_eq!(GeneratorState::decode(state.encode()), state);
        }
        assert_eq!(GeneratorState::SuspendedYield(2).encode(), 6);
    }

    #[test]
    fn test_executing_always_fails() {
        for action in ResumeAction::ALL {
            assert_eq!(
                transition(GeneratorState::Executing, action),
                Transition::Fail {
                    kind: ErrorKind::TypeError,
                    message: ALREADY_RUNNING
                }
            );
        }
    }

    #[test]
    fn test_transition_table() {
        use GeneratorState::*;
        assert_eq!(transition(Created, ResumeAction::Next), Transition::RunPrologue);
        assert_eq!(transition(SuspendedStart, ResumeAction::Next), Transition::EnterBody);
        assert_eq!(
            transition(SuspendedStart, ResumeAction::Return),
            Transition::Finish(Finish::Return)
        );
        assert_eq!(
            transition(SuspendedYield(3), ResumeAction::Throw),
            Transition::Resume {
                point: 3,
                action: ResumeAction::Throw
            }
        );
        assert_eq!(transition(Completed, ResumeAction::Next), Transition::Finish(Finish::Done));
        assert_eq!(transition(Completed, ResumeAction::Throw), Transition::Finish(Finish::Throw));
    }

    #[test]
    fn test_next_state() {
        use GeneratorState::*;
        let fail = transition(Executing, ResumeAction::Next);
        assert_eq!(fail.next_state(Executing), Executing);
        assert_eq!(transition(Created, ResumeAction::Next).next_state(Created), SuspendedStart);
        assert_eq!(
            transition(SuspendedYield(0), ResumeAction::Return).next_state(SuspendedYield(0)),
            Executing
        );
        assert_eq!(transition(SuspendedStart, ResumeAction::Throw).next_state(SuspendedStart), Completed);
    }

    #[test]
    fn test_action_codes() {
        for action in ResumeAction::ALL {
            assert_eq!(ResumeAction::decode(action.encode()), Some(action));
        }
        assert_eq!(ResumeAction::decode(9), None);
    }
}
