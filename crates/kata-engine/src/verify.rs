//! Checking submissions against an exercise's rules.
//!
//! Rules are applied in a fixed order and the first failure wins:
//!
//! 1. every required substring must appear in the normalized submission;
//! 2. no forbidden substring may appear in it;
//! 3. the custom validator, if any, must accept the raw submission.
//!
//! A rule set with no rules accepts everything. Verification has no side
//! effects; recording completion is the session's job.

use kata_sandbox::{evaluate_validator, SandboxLimits};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{CustomValidator, RuleSet};

/// Messages shown when a submission passes.
pub const SUCCESS_MESSAGES: &[&str] = &[
    "Correct! Nicely done.",
    "That's it! Great work.",
    "Spot on!",
    "Well done, that passes every check.",
    "Excellent! On to the next one.",
];

/// Messages shown when a submission fails without a specific reason.
pub const ENCOURAGEMENT_MESSAGES: &[&str] = &[
    "Not quite. Check the instructions and try again.",
    "Almost there. Keep going!",
    "Close, but something is still missing.",
    "Give it another try. The hint may help.",
];

/// Lowercases `source`, collapses whitespace runs to one space, drops
/// whitespace next to `<` and `>`, and trims.
///
/// Normalizing twice gives the same result as normalizing once.
#[must_use]
pub fn normalize(source: &str) -> String {
    let lowered = source.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with(['<', '>']) && c != '<' && c != '>'
        {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// What the rules decided, before any feedback text is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every rule accepted the submission.
    Pass,
    /// A rule rejected the submission. The message may be empty.
    Fail(String),
}

impl Verdict {
    /// Returns `true` for [`Verdict::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Applies `rules` to `source`.
#[must_use]
pub fn evaluate(rules: &RuleSet, source: &str, limits: &SandboxLimits) -> Verdict {
    let normalized = normalize(source);

    if let Some(entry) = rules
        .required_substrings
        .iter()
        .find(|entry| !normalized.contains(&entry.to_lowercase()))
    {
        return Verdict::Fail(format!("contains-missing: {entry}"));
    }

    if let Some(entry) = rules
        .forbidden_substrings
        .iter()
        .find(|entry| normalized.contains(&entry.to_lowercase()))
    {
        return Verdict::Fail(format!("contains-forbidden: {entry}"));
    }

    match &rules.custom_validator {
        None => Verdict::Pass,
        Some(validator) => run_validator(validator, source, limits),
    }
}

fn run_validator(validator: &CustomValidator, source: &str, limits: &SandboxLimits) -> Verdict {
    let report = match validator {
        CustomValidator::Script { script } => match evaluate_validator(script, source, limits) {
            Ok(report) => report,
            Err(fault) => {
                tracing::debug!(fault = %fault, "validator script faulted");
                return Verdict::Fail(format!("validator-error: {fault}"));
            }
        },
        CustomValidator::Pattern { pattern, message } => {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(e) => return Verdict::Fail(format!("validator-error: {e}")),
            };
            kata_sandbox::ValidatorReport {
                valid: re.is_match(source),
                message: message.clone(),
            }
        }
        CustomValidator::Native(check) => check(source),
    };

    if report.valid {
        Verdict::Pass
    } else {
        Verdict::Fail(report.message)
    }
}

/// The result of a submission, with the feedback to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the submission is correct.
    pub passed: bool,
    /// Feedback for the learner.
    pub message: String,
}

impl Outcome {
    /// Picks feedback for `verdict` from the message pools using `rng`.
    pub fn from_verdict<R: Rng + ?Sized>(verdict: Verdict, rng: &mut R) -> Self {
        match verdict {
            Verdict::Pass => Self {
                passed: true,
                message: pick(SUCCESS_MESSAGES, rng),
            },
            Verdict::Fail(message) if !message.is_empty() => Self {
                passed: false,
                message,
            },
            Verdict::Fail(_) => Self {
                passed: false,
                message: pick(ENCOURAGEMENT_MESSAGES, rng),
            },
        }
    }
}

fn pick<R: Rng + ?Sized>(pool: &[&str], rng: &mut R) -> String {
    pool.choose(rng).copied().unwrap_or_default().to_string()
}

/// Verifies `source` with default sandbox limits.
#[must_use]
pub fn verify(rules: &RuleSet, source: &str) -> Outcome {
    verify_with_limits(rules, source, &SandboxLimits::default())
}

/// Verifies `source`, running validator scripts under `limits`.
#[must_use]
pub fn verify_with_limits(rules: &RuleSet, source: &str, limits: &SandboxLimits) -> Outcome {
    Outcome::from_verdict(evaluate(rules, source, limits), &mut rand::thread_rng())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use kata_sandbox::ValidatorReport;
    use rand::rngs::mock::StepRng;

    use super::*;

    fn rules(required: &[&str], forbidden: &[&str]) -> RuleSet {
        RuleSet {
            required_substrings: required.iter().map(ToString::to_string).collect(),
            forbidden_substrings: forbidden.iter().map(ToString::to_string).collect(),
            custom_validator: None,
        }
    }

    fn check(rules: &RuleSet, source: &str) -> Verdict {
        evaluate(rules, source, &SandboxLimits::default())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  <UL>\n  <li> One </li>\n</UL>  "), "<ul><li>one</li></ul>");
        assert_eq!(normalize("let   x =\t1;"), "let x = 1;");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for source in [
            "  <div  class=\"a\" >\n  Hi  there </div> ",
            "console.log( 'A   B' )",
            "<p>\u{a0}x</p>",
        ] {
            let once = normalize(source);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_required_matching_is_case_insensitive() {
        let rules = rules(&["<H1>", "Hello World"], &[]);
        assert_eq!(check(&rules, "<h1>hello   world</h1>"), Verdict::Pass);
    }

    #[test]
    fn test_first_missing_entry_is_reported_verbatim() {
        let rules = rules(&["<h1>", "<H2>", "<h3>"], &[]);
        assert_eq!(
            check(&rules, "<h1>Title</h1>"),
            Verdict::Fail("contains-missing: <H2>".to_string())
        );
    }

    #[test]
    fn test_forbidden_entry_fails_with_its_name() {
        let rules = rules(&["<p>"], &["<b>", "style="]);
        assert_eq!(
            check(&rules, "<p style=\"color:red\">x</p>"),
            Verdict::Fail("contains-forbidden: style=".to_string())
        );
    }

    #[test]
    fn test_required_checked_before_forbidden() {
        let rules = rules(&["<em>"], &["<b>"]);
        assert_eq!(
            check(&rules, "<b>bold</b>"),
            Verdict::Fail("contains-missing: <em>".to_string())
        );
    }

    #[test]
    fn test_empty_rule_set_passes_anything() {
        assert!(RuleSet::default().is_empty());
        assert_eq!(check(&RuleSet::default(), ""), Verdict::Pass);
        assert_eq!(check(&RuleSet::default(), "garbage"), Verdict::Pass);
    }

    #[test]
    fn test_script_validator_sees_raw_source() {
        let mut rules = rules(&[], &[]);
        rules.custom_validator = Some(CustomValidator::Script {
            script: "(code) => ({ valid: code.includes('  '), message: 'Keep the double space' })"
                .to_string(),
        });
        assert_eq!(check(&rules, "a  b"), Verdict::Pass);
        assert_eq!(
            check(&rules, "a b"),
            Verdict::Fail("Keep the double space".to_string())
        );
    }

    #[test]
    fn test_validator_runs_after_substring_rules() {
        let mut rules = rules(&["<ul>"], &[]);
        rules.custom_validator = Some(CustomValidator::native(|_| ValidatorReport {
            valid: false,
            message: "never reached".to_string(),
        }));
        assert_eq!(
            check(&rules, "<ol></ol>"),
            Verdict::Fail("contains-missing: <ul>".to_string())
        );
        assert_eq!(
            check(&rules, "<ul></ul>"),
            Verdict::Fail("never reached".to_string())
        );
    }

    #[test]
    fn test_faulting_validator_fails() {
        let mut rules = RuleSet::default();
        rules.custom_validator = Some(CustomValidator::Script {
            script: "(code) => code.missing.length".to_string(),
        });
        let Verdict::Fail(message) = check(&rules, "x") else {
            panic!("expected failure");
        };
        assert!(message.starts_with("validator-error: TypeError"), "{message}");
    }

    #[test]
    fn test_pattern_validator() {
        let mut rules = RuleSet::default();
        rules.custom_validator = Some(CustomValidator::Pattern {
            pattern: r"\.map\(".to_string(),
            message: "Use map".to_string(),
        });
        assert_eq!(check(&rules, "xs.map(x => x)"), Verdict::Pass);
        assert_eq!(check(&rules, "xs.forEach(f)"), Verdict::Fail("Use map".to_string()));

        rules.custom_validator = Some(CustomValidator::Pattern {
            pattern: "(".to_string(),
            message: String::new(),
        });
        let Verdict::Fail(message) = check(&rules, "x") else {
            panic!("expected failure");
        };
        assert!(message.starts_with("validator-error: "));
    }

    #[test]
    fn test_outcome_feedback_pools() {
        let mut rng = StepRng::new(0, 1);
        let passed = Outcome::from_verdict(Verdict::Pass, &mut rng);
        assert!(passed.passed);
        assert!(SUCCESS_MESSAGES.contains(&passed.message.as_str()));

        let failed = Outcome::from_verdict(Verdict::Fail(String::new()), &mut rng);
        assert!(!failed.passed);
        assert!(ENCOURAGEMENT_MESSAGES.contains(&failed.message.as_str()));

        let specific = Outcome::from_verdict(Verdict::Fail("contains-missing: <a>".into()), &mut rng);
        assert_eq!(specific.message, "contains-missing: <a>");
    }

    #[test]
    fn test_verify_uses_rule_message() {
        let outcome = verify(&rules(&["<nav>"], &[]), "<div></div>");
        assert_eq!(
            outcome,
            Outcome {
                passed: false,
                message: "contains-missing: <nav>".to_string()
            }
        );
    }
}
