use serde::Deserialize;

use crate::models::{SubmitResult, TestOutcome};

/// One line of `go test -json` output. Lines that do not deserialize into
/// this shape are tool banners or stray prints, not errors.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct TestEvent {
    action: String,
    test: String,
    output: String,
    elapsed: f64,
}

struct PendingOutcome {
    name: String,
    output: String,
    verdict: Option<bool>,
}

/// Aggregates the raw combined output of one sandbox run into a verdict.
///
/// Outcomes keep first-seen order so repeated grading of the same
/// submission renders identically. A test's verdict is the last pass/fail
/// event observed for its name; tests that never reach a terminal event
/// contribute no outcome.
pub fn parse_test_output(stdout: &str, stderr: &str) -> SubmitResult {
    // Toolchain-level fatal errors land on stderr before any structured
    // line is emitted.
    if !stderr.is_empty() && !stdout.contains("\"Action\"") {
        return SubmitResult::failed(stderr);
    }

    let mut pending: Vec<PendingOutcome> = Vec::new();

    for line in stdout.trim().lines() {
        let Ok(event) = serde_json::from_str::<TestEvent>(line) else {
            continue;
        };
        if event.test.is_empty() {
            continue;
        }

        let idx = match pending.iter().position(|p| p.name == event.test) {
            Some(idx) => idx,
            None => {
                pending.push(PendingOutcome {
                    name: event.test.clone(),
                    output: String::new(),
                    verdict: None,
                });
                pending.len() - 1
            }
        };

        match event.action.as_str() {
            "output" => pending[idx].output.push_str(&event.output),
            "pass" => {
                tracing::debug!(test = %event.test, elapsed = event.elapsed, "test passed");
                pending[idx].verdict = Some(true);
            }
            "fail" => {
                tracing::debug!(test = %event.test, elapsed = event.elapsed, "test failed");
                pending[idx].verdict = Some(false);
            }
            _ => {}
        }
    }

    let tests: Vec<TestOutcome> = pending
        .into_iter()
        .filter_map(|p| {
            p.verdict.map(|passed| TestOutcome {
                name: p.name,
                passed,
                output: p.output,
            })
        })
        .collect();

    // No test reached a verdict: the suite never ran (compile error, panic
    // during setup). Hand back everything we saw as the diagnostic.
    if tests.is_empty() {
        return SubmitResult::failed(format!("{stdout}{stderr}"));
    }

    let passed = tests.iter().all(|t| t.passed);
    SubmitResult {
        passed,
        tests,
        error: None,
    }
}
