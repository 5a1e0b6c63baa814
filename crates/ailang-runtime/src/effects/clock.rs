//! Clock effect operations
//!
//! Real mode reads the wall clock via `chrono` and `sleep` blocks.
//! Virtual mode keeps a deterministic millisecond counter: `now` reads
//! it and `sleep` advances it without blocking, so tests and `--seed`
//! runs are reproducible.

use super::{int_arg, ClockMode, EffectContext, OpRegistry};
use crate::value::{RuntimeError, Value};
use chrono::Utc;
use std::time::Duration;

/// Register Clock operations
pub fn register(registry: &mut OpRegistry) {
    registry.register("Clock", "now", now_op);
    registry.register("Clock", "sleep", sleep_op);
}

fn now_op(ctx: &EffectContext, _args: &[Value]) -> Result<Value, RuntimeError> {
    match &ctx.clock {
        ClockMode::Real => Ok(Value::Int(Utc::now().timestamp_millis())),
        ClockMode::Virtual(cell) => Ok(Value::Int(cell.get())),
    }
}

fn sleep_op(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let ms = int_arg(args, 0)?;
    if ms < 0 {
        return Err(RuntimeError::Effect {
            code: "E_CLOCK_NEGATIVE".to_string(),
            message: format!("cannot sleep for {} ms", ms),
        });
    }
    match &ctx.clock {
        ClockMode::Real => std::thread::sleep(Duration::from_millis(ms as u64)),
        ClockMode::Virtual(cell) => cell.set(cell.get().saturating_add(ms)),
    }
    Ok(Value::Unit)
}
