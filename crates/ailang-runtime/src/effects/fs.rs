//! FS effect operations

use super::{str_arg, EffectContext, OpRegistry};
use crate::value::{RuntimeError, Value};
use std::fs;
use std::io::ErrorKind;

/// Register FS operations
pub fn register(registry: &mut OpRegistry) {
    registry.register("FS", "readFile", read_file_op);
    registry.register("FS", "writeFile", write_file_op);
    registry.register("FS", "exists", exists_op);
}

fn read_file_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0)?;
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Value::string(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(RuntimeError::Effect {
            code: "E_FS_NOT_FOUND".to_string(),
            message: format!("file not found: `{}`", path),
        }),
        Err(e) => Err(RuntimeError::Effect {
            code: "E_FS_READ".to_string(),
            message: format!("failed to read `{}`: {}", path, e),
        }),
    }
}

fn write_file_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0)?;
    let contents = str_arg(args, 1)?;
    fs::write(path, contents).map_err(|e| RuntimeError::Effect {
        code: "E_FS_WRITE".to_string(),
        message: format!("failed to write `{}`: {}", path, e),
    })?;
    Ok(Value::Unit)
}

fn exists_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0)?;
    Ok(Value::Bool(std::path::Path::new(path).exists()))
}
