//! Evaluation of custom validator scripts.
//!
//! A validator is a script whose completion value is a function, e.g.
//! `(code) => ({ valid: code.includes("<h1>"), message: "Add a heading" })`.
//! Scripts that only declare `function validate(code) { ... }` are accepted
//! too. The function receives the unnormalized submission and may return an
//! object with `valid` and `message`, or a plain boolean.

use serde::{Deserialize, Serialize};

use crate::console::{Console, DiscardSink};
use crate::script::{run_isolated, to_js_string, SandboxLimits, ScriptFault, Value};

/// Name of the function looked up when the script does not end in one.
const VALIDATE_FN: &str = "validate";

/// What a validator decided about a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorReport {
    /// Whether the submission is acceptable.
    pub valid: bool,
    /// Message for the learner; empty when the validator gave none.
    #[serde(default)]
    pub message: String,
}

/// Runs `script` in a fresh interpreter and applies the validator it
/// defines to `submission`.
///
/// Console output is discarded. Faults raised while loading or calling the
/// validator are returned as errors.
pub fn evaluate_validator(
    script: &str,
    submission: &str,
    limits: &SandboxLimits,
) -> Result<ValidatorReport, ScriptFault> {
    let mut console = Console::new(DiscardSink);
    run_isolated(&mut console, None, *limits, |interp| {
        let completion = interp.run(script)?;
        let validator = if completion.is_callable() {
            completion
        } else {
            interp
                .global(VALIDATE_FN)
                .filter(Value::is_callable)
                .ok_or_else(|| {
                    ScriptFault::new(
                        "TypeError",
                        "validator script must evaluate to a function or declare validate(code)",
                    )
                })?
        };
        let verdict = interp.call(&validator, vec![Value::from(submission)])?;
        Ok(report_from(&verdict))
    })
}

fn report_from(verdict: &Value) -> ValidatorReport {
    match verdict {
        Value::Object(obj) => {
            let obj = obj.borrow();
            let valid = obj.props.get("valid").is_some_and(Value::truthy);
            let message = obj
                .props
                .get("message")
                .filter(|message| !message.is_nullish())
                .map(to_js_string)
                .unwrap_or_default();
            ValidatorReport { valid, message }
        }
        other => ValidatorReport {
            valid: other.truthy(),
            message: String::new(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HEADING: &str =
        "(code) => ({ valid: code.includes('<h1>'), message: code.includes('<h1>') ? '' : 'Add an <h1> heading' })";

    #[test]
    fn test_completion_function_is_the_validator() {
        let limits = SandboxLimits::default();
        let pass = evaluate_validator(HEADING, "<h1>Hi</h1>", &limits).unwrap();
        assert_eq!(
            pass,
            ValidatorReport {
                valid: true,
                message: String::new()
            }
        );

        let fail = evaluate_validator(HEADING, "<p>Hi</p>", &limits).unwrap();
        assert!(!fail.valid);
        assert_eq!(fail.message, "Add an <h1> heading");
    }

    #[test]
    fn test_declared_validate_function() {
        let script = "function validate(code) { return code.trim().length > 3 }";
        let limits = SandboxLimits::default();
        assert!(evaluate_validator(script, "  long enough ", &limits).unwrap().valid);
        assert!(!evaluate_validator(script, " ab ", &limits).unwrap().valid);
    }

    #[test]
    fn test_validator_sees_unnormalized_source() {
        let script = "(code) => code.includes('\\n  ')";
        let report = evaluate_validator(script, "a\n  b", &SandboxLimits::default()).unwrap();
        assert!(report.valid);
    }

    #[test]
    fn test_non_function_script_is_a_type_error() {
        let fault = evaluate_validator("42", "x", &SandboxLimits::default()).unwrap_err();
        assert_eq!(fault.name, "TypeError");
    }

    #[test]
    fn test_faults_are_returned() {
        let fault =
            evaluate_validator("(code) => code.nope()", "x", &SandboxLimits::default()).unwrap_err();
        assert_eq!(fault.to_string(), "TypeError: code.nope is not a function");

        let limits = SandboxLimits {
            max_steps: 1_000,
            ..SandboxLimits::default()
        };
        let fault = evaluate_validator("(code) => { while (true) {} }", "x", &limits).unwrap_err();
        assert_eq!(fault.name, "RangeError");
    }
}
