//! Promises and the microtask queue driving async machines

use super::exec::throw_error;
use super::value::{Object, ObjectKind, ObjectRef, PromiseState, Reaction, Value};
use super::{InterpResult, Interpreter, Step, Unwind};
use crate::generator::ResumeAction;
use crate::ir::ErrorKind;
use std::cell::RefCell;
use std::rc::Rc;

/// One running async function: its machine and the promise it settles
pub(super) struct AsyncTask {
    generator: Value,
    promise: ObjectRef,
}

/// A deferred resumption of an async machine
pub(super) struct Microtask {
    task: usize,
    action: ResumeAction,
    value: Value,
}

fn new_promise(state: PromiseState) -> ObjectRef {
    Rc::new(RefCell::new(Object::new(ObjectKind::Promise(state))))
}

fn promise_state(value: &Value) -> Option<(ObjectRef, PromiseState)> {
    let object = value.as_object()?;
    let state = match &object.borrow().kind {
        ObjectKind::Promise(state) => state.clone(),
        _ => return None,
    };
    Some((object.clone(), state))
}

impl<'m> Interpreter<'m> {
    /// `resolved(value)` and `rejected(reason)`
    pub(super) fn settled_promise(&mut self, value: Value, rejected: bool) -> Step<Value> {
        let state = if rejected {
            PromiseState::Rejected(value)
        } else {
            PromiseState::Fulfilled(value)
        };
        Ok(Value::Object(new_promise(state)))
    }

    /// Start an async function: run its machine up to the first suspension and
    /// hand back the promise of its result
    pub(super) fn start_async(&mut self, generator: Value) -> Step<Value> {
        let promise = new_promise(PromiseState::Pending(Vec::new()));
        self.tasks.push(AsyncTask {
            generator,
            promise: promise.clone(),
        });
        let task = self.tasks.len() - 1;
        self.step_task(task, ResumeAction::Next, Value::Undefined)?;
        Ok(Value::Object(promise))
    }

    fn step_task(&mut self, task: usize, action: ResumeAction, value: Value) -> Step<()> {
        let (generator, promise) = match self.tasks.get(task) {
            Some(t) => (t.generator.clone(), t.promise.clone()),
            None => return Ok(()),
        };
        match self.resume_generator(&generator, action, value) {
            Ok(result) => {
                let done = self.get_property(&result, "done")?.to_boolean();
                let value = self.get_property(&result, "value")?;
                if done {
                    self.resolve_promise(&promise, value);
                } else {
                    self.await_value(task, value);
                }
                Ok(())
            }
            Err(Unwind::Throw(reason)) => {
                self.settle(&promise, PromiseState::Rejected(reason));
                Ok(())
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// Schedule the continuation of `task` once `value` settles
    fn await_value(&mut self, task: usize, value: Value) {
        let Some((promise, state)) = promise_state(&value) else {
            self.microtasks.push_back(Microtask {
                task,
                action: ResumeAction::Next,
                value,
            });
            return;
        };
        match state {
            PromiseState::Fulfilled(value) => self.microtasks.push_back(Microtask {
                task,
                action: ResumeAction::Next,
                value,
            }),
            PromiseState::Rejected(reason) => self.microtasks.push_back(Microtask {
                task,
                action: ResumeAction::Throw,
                value: reason,
            }),
            PromiseState::Pending(_) => {
                if let ObjectKind::Promise(PromiseState::Pending(reactions)) = &mut promise.borrow_mut().kind {
                    reactions.push(Reaction::Resume(task));
                }
            }
        }
    }

    fn resolve_promise(&mut self, promise: &ObjectRef, value: Value) {
        let Some((inner, state)) = promise_state(&value) else {
            self.settle(promise, PromiseState::Fulfilled(value));
            return;
        };
        if Rc::ptr_eq(&inner, promise) {
            let reason = match throw_error(ErrorKind::TypeError, "Chaining cycle detected for promise") {
                Unwind::Throw(reason) => reason,
                Unwind::Fatal(_) => Value::Undefined,
            };
            self.settle(promise, PromiseState::Rejected(reason));
            return;
        }
        match state {
            PromiseState::Pending(_) => {
                if let ObjectKind::Promise(PromiseState::Pending(reactions)) = &mut inner.borrow_mut().kind {
                    reactions.push(Reaction::Adopt(promise.clone()));
                }
            }
            settled => self.settle(promise, settled),
        }
    }

    /// Settle a pending promise and run its reactions. Settled promises stay as they are.
    fn settle(&mut self, promise: &ObjectRef, state: PromiseState) {
        let reactions = {
            let mut object = promise.borrow_mut();
            let ObjectKind::Promise(current) = &mut object.kind else { return };
            let PromiseState::Pending(reactions) = current else { return };
            let reactions = std::mem::take(reactions);
            *current = state.clone();
            reactions
        };
        for reaction in reactions {
            match reaction {
                Reaction::Resume(task) => {
                    let (action, value) = match &state {
                        PromiseState::Rejected(reason) => (ResumeAction::Throw, reason.clone()),
                        PromiseState::Fulfilled(value) => (ResumeAction::Next, value.clone()),
                        PromiseState::Pending(_) => continue,
                    };
                    self.microtasks.push_back(Microtask { task, action, value });
                }
                Reaction::Adopt(other) => self.settle(&other, state.clone()),
            }
        }
    }

    pub(super) fn drain_microtasks(&mut self) -> InterpResult<()> {
        while let Some(job) = self.microtasks.pop_front() {
            self.tick()?;
            match self.step_task(job.task, job.action, job.value) {
                Ok(()) => {}
                Err(Unwind::Fatal(err)) => return Err(err),
                Err(Unwind::Throw(reason)) => {
                    log::warn!("[interp] exception escaped an async continuation: {}", reason);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_is_one_shot() {
        let module = crate::ir::IrModule::new("main".to_string());
        let mut interp = Interpreter::new(&module);
        let promise = new_promise(PromiseState::Pending(Vec::new()));
        interp.settle(&promise, PromiseState::Fulfilled(Value::Number(1.0)));
        interp.settle(&promise, PromiseState::Rejected(Value::Number(2.0)));
        let state = promise_state(&Value::Object(promise)).map(|(_, s)| s);
        assert!(matches!(state, Some(PromiseState::Fulfilled(Value::Number(n))) if n == 1.0));
    }

    #[test]
    fn test_adopted_promise_follows_inner() {
        let module = crate::ir::IrModule::new("main".to_string());
        let mut interp = Interpreter::new(&module);
        let outer = new_promise(PromiseState::Pending(Vec::new()));
        let inner = new_promise(PromiseState::Pending(Vec::new()));
        interp.resolve_promise(&outer, Value::Object(inner.clone()));
        interp.settle(&inner, PromiseState::Rejected(Value::string("no")));
        let state = promise_state(&Value::Object(outer)).map(|(_, s)| s);
        assert!(matches!(state, Some(PromiseState::Rejected(_))));
    }
}
