//! Env effect operations

use super::{str_arg, EffectContext, OpRegistry};
use crate::value::{RuntimeError, Value};

/// Register Env operations
pub fn register(registry: &mut OpRegistry) {
    registry.register("Env", "get", get_op);
}

fn get_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = str_arg(args, 0)?;
    match std::env::var(name) {
        Ok(value) => Ok(Value::string(value)),
        Err(std::env::VarError::NotPresent) => Err(RuntimeError::Effect {
            code: "E_ENV_NOT_FOUND".to_string(),
            message: format!("environment variable `{}` is not set", name),
        }),
        Err(std::env::VarError::NotUnicode(_)) => Err(RuntimeError::Effect {
            code: "E_ENV_INVALID".to_string(),
            message: format!("environment variable `{}` is not valid UTF-8", name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::call;

    #[test]
    fn test_get_reads_process_env() {
        std::env::set_var("AILANG_TEST_VAR", "42");
        let ctx = EffectContext::new(["Env"]);
        let value = call(&ctx, "Env", "get", &[Value::string("AILANG_TEST_VAR")]).unwrap();
        assert_eq!(value, Value::string("42"));
    }

    #[test]
    fn test_missing_var_is_reported() {
        let ctx = EffectContext::new(["Env"]);
        let err = call(
            &ctx,
            "Env",
            "get",
            &[Value::string("AILANG_DEFINITELY_NOT_SET")],
        )
        .unwrap_err();
        assert_eq!(err.code(), "E_ENV_NOT_FOUND");
    }
}
