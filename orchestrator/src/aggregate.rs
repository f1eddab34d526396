//! Reduction of per-test-case results into submission-level numbers.

use crate::{model::TestCaseResult, verdict::VerdictKind};

/// Submission-level summary of a list of test case results.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Worst verdict present; `Accepted` when there are no results.
    pub verdict: VerdictKind,
    /// Sum of times, in seconds. Unknown times count as zero.
    pub time: f64,
    /// Peak memory, in kilobytes. Unknown values count as zero.
    pub memory: u64,
    /// First non-empty stdout, in test case order. For display only; it does
    /// not necessarily belong to the failing case.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
}

fn first_non_empty<'a>(
    results: &'a [TestCaseResult],
    field: impl Fn(&'a TestCaseResult) -> Option<&'a String>,
) -> Option<String> {
    results
        .iter()
        .filter_map(field)
        .find(|s| !s.is_empty())
        .cloned()
}

pub fn aggregate(results: &[TestCaseResult]) -> Aggregate {
    let verdict = VerdictKind::worst(results.iter().map(|r| &r.verdict))
        .cloned()
        .unwrap_or_default();
    let time = results
        .iter()
        .filter_map(|r| r.time)
        .filter(|t| t.is_finite())
        .sum();
    let memory = results
        .iter()
        .filter_map(|r| r.memory)
        .max()
        .unwrap_or(0);

    if verdict.is_transient() {
        tracing::error!(%verdict, "Pending verdict survived polling");
    }

    Aggregate {
        verdict,
        time,
        memory,
        stdout: first_non_empty(results, |r| r.actual_output.as_ref()),
        stderr: first_non_empty(results, |r| r.stderr.as_ref()),
        compile_output: first_non_empty(results, |r| r.compile_output.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestCase;
    use VerdictKind::*;

    fn result(verdict: VerdictKind, time: Option<f64>, memory: Option<u64>) -> TestCaseResult {
        let case = TestCase {
            input: String::new(),
            expected_output: String::new(),
            is_hidden: false,
        };
        TestCaseResult {
            time,
            memory,
            ..TestCaseResult::synthetic(&case, verdict, None)
        }
    }

    #[test]
    fn empty_is_accepted() {
        let agg = aggregate(&[]);
        assert_eq!(agg.verdict, Accepted);
        assert_eq!(agg.time, 0.0);
        assert_eq!(agg.memory, 0);
        assert_eq!(agg.stdout, None);
    }

    #[test]
    fn worst_verdict_time_sum_memory_max() {
        let agg = aggregate(&[
            result(Accepted, Some(0.01), Some(1000)),
            result(WrongAnswer, Some(0.02), Some(1200)),
        ]);
        assert_eq!(agg.verdict, WrongAnswer);
        assert!((agg.time - 0.03).abs() < 1e-9);
        assert_eq!(agg.memory, 1200);
    }

    #[test]
    fn all_accepted_is_accepted() {
        let agg = aggregate(&[
            result(Accepted, Some(0.1), Some(10)),
            result(Accepted, Some(0.2), Some(30)),
            result(Accepted, Some(0.3), Some(20)),
        ]);
        assert_eq!(agg.verdict, Accepted);
        assert_eq!(agg.memory, 30);
    }

    #[test]
    fn missing_numbers_count_as_zero() {
        let agg = aggregate(&[
            result(Accepted, None, None),
            result(Timeout, Some(0.5), None),
            result(JudgeApiError, None, Some(64)),
        ]);
        assert_eq!(agg.verdict, Timeout);
        assert_eq!(agg.time, 0.5);
        assert_eq!(agg.memory, 64);
    }

    #[test]
    fn compilation_error_beats_runtime_error() {
        let agg = aggregate(&[
            result(RuntimeError(Some("SIGSEGV".into())), None, None),
            result(CompilationError, None, None),
            result(TimeLimitExceeded, None, None),
        ]);
        assert_eq!(agg.verdict, CompilationError);
    }

    #[test]
    fn summaries_take_first_non_empty() {
        let mut a = result(Accepted, None, None);
        a.actual_output = Some(String::new());
        a.stderr = Some("warning".into());
        let mut b = result(WrongAnswer, None, None);
        b.actual_output = Some("42\n".into());
        b.compile_output = Some("note: something".into());
        let agg = aggregate(&[a, b]);
        assert_eq!(agg.stdout.as_deref(), Some("42\n"));
        assert_eq!(agg.stderr.as_deref(), Some("warning"));
        assert_eq!(agg.compile_output.as_deref(), Some("note: something"));
    }
}
