//! End-to-end tests for the Kiln lowering pipeline
//!
//! These tests lower source text to IR and execute it in the reference interpreter,
//! checking the observable behavior of the lowered code.

mod harness;

mod async_await;
mod closures;
mod destructuring;
mod exceptions;
mod generators;
mod generics;
mod loops;
mod tdz;
