//! Basic arithmetic, for models that cannot be trusted with numbers.

use crate::tools::core::{Tool, ToolFuture};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;

/// Typed arguments for `do_math_operations`.
#[derive(Deserialize, JsonSchema)]
pub struct MathOperationsArgs {
    /// Left operand.
    pub a: f64,
    /// One of "+", "-", "*", "/".
    pub op: String,
    /// Right operand.
    pub b: f64,
}

/// Evaluate one binary arithmetic operation exactly.
pub struct MathOperations;

impl Tool for MathOperations {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "do_math_operations",
            "Performs one exact arithmetic operation between two numbers. \
             Use it for any calculation instead of computing yourself. \
             Supported operators: +, -, *, /.",
            json_schema_for::<MathOperationsArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: MathOperationsArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;
            let result = match args.op.as_str() {
                "+" => args.a + args.b,
                "-" => args.a - args.b,
                "*" => args.a * args.b,
                "/" => {
                    if args.b == 0.0 {
                        return Err("Error, division by zero".to_string());
                    }
                    args.a / args.b
                }
                other => return Err(format!("Error, unknown operator '{other}'")),
            };
            Ok(format_number(result))
        })
    }
}

/// Render whole results without a trailing ".0" so the model reads "6",
/// not "6.0".
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(a: f64, op: &str, b: f64) -> Result<String, String> {
        MathOperations
            .invoke(&serde_json::json!({"a": a, "op": op, "b": b}))
            .await
    }

    #[tokio::test]
    async fn whole_results_have_no_decimal_point() {
        assert_eq!(run(3.0, "*", 2.0).await.unwrap(), "6");
        assert_eq!(run(10.0, "-", 4.0).await.unwrap(), "6");
    }

    #[tokio::test]
    async fn fractional_results_keep_their_digits() {
        assert_eq!(run(1.0, "/", 2.0).await.unwrap(), "0.5");
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        let err = run(1.0, "/", 0.0).await.unwrap_err();
        assert!(err.contains("division by zero"));
    }

    #[tokio::test]
    async fn unknown_operator_is_an_error() {
        let err = run(1.0, "%", 2.0).await.unwrap_err();
        assert!(err.contains("unknown operator"));
    }
}
