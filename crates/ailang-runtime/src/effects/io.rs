//! IO effect operations

use super::{str_arg, EffectContext, OpRegistry};
use crate::value::{RuntimeError, Value};
use std::io::BufRead;

/// Register IO operations
pub fn register(registry: &mut OpRegistry) {
    registry.register("IO", "println", println_op);
    registry.register("IO", "print", print_op);
    registry.register("IO", "readLine", read_line_op);
}

fn println_op(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = str_arg(args, 0)?;
    ctx.write(text);
    ctx.write("\n");
    Ok(Value::Unit)
}

fn print_op(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = str_arg(args, 0)?;
    ctx.write(text);
    Ok(Value::Unit)
}

fn read_line_op(_ctx: &EffectContext, _args: &[Value]) -> Result<Value, RuntimeError> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| RuntimeError::Effect {
            code: "E_IO_READ".to_string(),
            message: format!("failed to read from stdin: {}", e),
        })?;
    // Strip the trailing newline like every other line-oriented reader
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Value::string(line))
}
