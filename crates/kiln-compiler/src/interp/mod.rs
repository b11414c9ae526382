//! Reference IR interpreter
//!
//! Executes an [`IrModule`] directly, block by block, with a minimal object model:
//! plain objects, arrays, closures, classes, environment records, iterators,
//! generators and promises. It exists to observe the runtime behavior of lowered
//! code (TDZ errors, destructuring results, generator resumption) and is not meant
//! to be fast.
//!
//! Host globals:
//! - `log(...values)` appends the values, space separated, to [`Interpreter::output`]
//! - `sideEffect(...values)` appends `sideEffect` followed by the values
//! - `resolved(value)` / `rejected(reason)` create settled promises
//!
//! Async functions settle through a microtask queue drained after the module body,
//! so code after an `await` runs after the caller has continued.

mod exec;
mod promise;
mod value;

pub use value::{format_number, EnvRecord, EnvRef, Native, Object, ObjectKind, ObjectRef, PromiseState, Reaction, Value};

use crate::ir::{BasicBlockId, FunctionId, IrModule, RegisterId};
use promise::{AsyncTask, Microtask};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use thiserror::Error;

/// Failures of the interpreter itself: malformed IR, limits, unsupported operations.
/// Exceptions thrown by the program are reported as [`Completion::Throw`].
#[derive(Debug, Error)]
pub enum InterpError {
    #[error("function {0} is not in the module")]
    UnknownFunction(FunctionId),

    #[error("{function}: block {block} does not exist")]
    UnknownBlock { function: String, block: BasicBlockId },

    #[error("{function}: register {register} read before it was defined")]
    UndefinedRegister { function: String, register: RegisterId },

    #[error("{function}: block {block} has no terminator")]
    MissingTerminator { function: String, block: BasicBlockId },

    #[error("{function}: {message}")]
    Malformed { function: String, message: String },

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),

    #[error("unsupported at run time: {0}")]
    Unsupported(String),
}

pub type InterpResult<T> = Result<T, InterpError>;

/// How the module body finished
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Value),
    /// An exception escaped the module body
    Throw(Value),
}

impl Completion {
    pub fn is_throw(&self) -> bool {
        matches!(self, Completion::Throw(_))
    }

    pub fn value(&self) -> &Value {
        match self {
            Completion::Normal(value) | Completion::Throw(value) => value,
        }
    }
}

/// Abrupt completion while executing
#[derive(Debug)]
pub(crate) enum Unwind {
    Throw(Value),
    Fatal(InterpError),
}

impl From<InterpError> for Unwind {
    fn from(err: InterpError) -> Self {
        Unwind::Fatal(err)
    }
}

pub(crate) type Step<T> = Result<T, Unwind>;

const DEFAULT_STEP_LIMIT: u64 = 5_000_000;
const MAX_CALL_DEPTH: usize = 512;

/// Executes one lowered module
pub struct Interpreter<'m> {
    module: &'m IrModule,
    globals: FxHashMap<String, Value>,
    output: Vec<String>,
    steps: u64,
    step_limit: u64,
    depth: usize,
    tasks: Vec<AsyncTask>,
    microtasks: VecDeque<Microtask>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m IrModule) -> Self {
        let mut globals = FxHashMap::default();
        for (name, native) in [
            ("log", Native::Log),
            ("sideEffect", Native::SideEffect),
            ("resolved", Native::Resolved),
            ("rejected", Native::Rejected),
        ] {
            globals.insert(name.to_string(), Value::object(ObjectKind::Native(native)));
        }
        Self {
            module,
            globals,
            output: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            depth: 0,
            tasks: Vec::new(),
            microtasks: VecDeque::new(),
        }
    }

    /// Abort with [`InterpError::StepLimit`] after `limit` executed instructions
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Run the module body, then every pending microtask
    pub fn run(&mut self) -> InterpResult<Completion> {
        let entry = self.module.entry;
        let completion = match self.call_function(entry, None, Value::Undefined, Vec::new()) {
            Ok(value) => Completion::Normal(value),
            Err(Unwind::Throw(value)) => Completion::Throw(value),
            Err(Unwind::Fatal(err)) => return Err(err),
        };
        self.drain_microtasks()?;
        log::debug!(
            "[interp] {} finished after {} steps, {} output lines",
            self.module.name,
            self.steps,
            self.output.len()
        );
        Ok(completion)
    }

    /// Lines written by `log` and `sideEffect`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn tick(&mut self) -> InterpResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(InterpError::StepLimit(self.step_limit));
        }
        Ok(())
    }
}
