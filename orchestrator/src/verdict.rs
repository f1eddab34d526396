//! The closed verdict taxonomy and its priority order.

use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, convert::Infallible, fmt, str::FromStr};

/// Outcome of judging one test case, or of a whole submission.
///
/// Every string the judge service can send maps onto one of these; strings we
/// do not know about become [`VerdictKind::UnknownError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    Accepted,
    AcceptedWithWarnings,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    /// Any runtime failure. The payload is the judge's detail, e.g. `SIGSEGV`.
    RuntimeError(Option<String>),
    InternalError,
    CompilationError,
    UnknownError,
    /// Attempt budget ran out while the judge still reported the case as pending.
    Timeout,
    /// The status query for this case failed.
    JudgeApiError,
    /// Polling was stopped by a deadline or by the caller.
    Cancelled,
    PartialAccepted,
    InQueue,
    Processing,
}

impl VerdictKind {
    /// Priority of this verdict, from 0 (best) to 10 (worst).
    pub fn rank(&self) -> u8 {
        use VerdictKind::*;
        match self {
            Accepted => 0,
            AcceptedWithWarnings => 1,
            WrongAnswer => 2,
            TimeLimitExceeded => 3,
            MemoryLimitExceeded => 4,
            RuntimeError(_) => 5,
            InternalError => 6,
            CompilationError => 7,
            UnknownError | Timeout | JudgeApiError | Cancelled => 8,
            PartialAccepted => 9,
            InQueue | Processing => 10,
        }
    }

    /// Whether the judge is still working on the case.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerdictKind::InQueue | VerdictKind::Processing)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, VerdictKind::Accepted | VerdictKind::AcceptedWithWarnings)
    }

    /// Map a judge status description onto the taxonomy.
    pub fn from_description(desc: &str) -> VerdictKind {
        use VerdictKind::*;
        let desc = desc.trim();
        match desc {
            "Accepted" => Accepted,
            "Accepted (with warnings)" => AcceptedWithWarnings,
            "Wrong Answer" => WrongAnswer,
            "Time Limit Exceeded" => TimeLimitExceeded,
            "Memory Limit Exceeded" => MemoryLimitExceeded,
            "Runtime Error" => RuntimeError(None),
            "Exec Format Error" => RuntimeError(Some("Exec Format Error".into())),
            "Internal Error" => InternalError,
            "Compilation Error" => CompilationError,
            "Unknown Error" => UnknownError,
            "Unknown Error (Timeout)" => Timeout,
            "Judge API Error" => JudgeApiError,
            "Cancelled" => Cancelled,
            "Partial Accepted" => PartialAccepted,
            "In Queue" => InQueue,
            "Processing" => Processing,
            _ => {
                if let Some(detail) = desc
                    .strip_prefix("Runtime Error (")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    RuntimeError(Some(detail.to_owned()))
                } else {
                    tracing::warn!(description = %desc, "Unrecognized verdict, treating as unknown error");
                    UnknownError
                }
            }
        }
    }

    pub fn description(&self) -> Cow<'static, str> {
        use VerdictKind::*;
        let s = match self {
            Accepted => "Accepted",
            AcceptedWithWarnings => "Accepted (with warnings)",
            WrongAnswer => "Wrong Answer",
            TimeLimitExceeded => "Time Limit Exceeded",
            MemoryLimitExceeded => "Memory Limit Exceeded",
            RuntimeError(None) => "Runtime Error",
            RuntimeError(Some(detail)) => return format!("Runtime Error ({})", detail).into(),
            InternalError => "Internal Error",
            CompilationError => "Compilation Error",
            UnknownError => "Unknown Error",
            Timeout => "Unknown Error (Timeout)",
            JudgeApiError => "Judge API Error",
            Cancelled => "Cancelled",
            PartialAccepted => "Partial Accepted",
            InQueue => "In Queue",
            Processing => "Processing",
        };
        s.into()
    }

    /// The worst verdict in `verdicts`, or `None` if there is none. Among
    /// verdicts of equal rank the first one wins.
    pub fn worst<'a>(verdicts: impl IntoIterator<Item = &'a VerdictKind>) -> Option<&'a VerdictKind> {
        verdicts.into_iter().fold(None, |worst, v| match worst {
            Some(w) if w.rank() >= v.rank() => Some(w),
            _ => Some(v),
        })
    }
}

impl Default for VerdictKind {
    fn default() -> Self {
        VerdictKind::Accepted
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl FromStr for VerdictKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VerdictKind::from_description(s))
    }
}

impl Serialize for VerdictKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.description())
    }
}

struct VerdictVisitor;

impl<'de> Visitor<'de> for VerdictVisitor {
    type Value = VerdictKind;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a verdict description")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(VerdictKind::from_description(v))
    }
}

impl<'de> Deserialize<'de> for VerdictKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(VerdictVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerdictKind::*;

    #[test]
    fn ranks_follow_priority_table() {
        let ordered = [
            Accepted,
            AcceptedWithWarnings,
            WrongAnswer,
            TimeLimitExceeded,
            MemoryLimitExceeded,
            RuntimeError(Some("SIGSEGV".into())),
            InternalError,
            CompilationError,
            UnknownError,
            PartialAccepted,
            InQueue,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() < pair[1].rank(), "{} < {}", pair[0], pair[1]);
        }
        assert_eq!(Processing.rank(), InQueue.rank());
        assert_eq!(Timeout.rank(), UnknownError.rank());
        assert_eq!(JudgeApiError.rank(), UnknownError.rank());
        assert_eq!(Cancelled.rank(), UnknownError.rank());
    }

    #[test]
    fn runtime_signals_collapse() {
        for desc in [
            "Runtime Error (SIGSEGV)",
            "Runtime Error (SIGXFSZ)",
            "Runtime Error (SIGFPE)",
            "Runtime Error (SIGABRT)",
            "Runtime Error (NZEC)",
            "Runtime Error (Other)",
            "Exec Format Error",
        ] {
            let v = VerdictKind::from_description(desc);
            assert_eq!(v.rank(), 5, "{}", desc);
        }
        assert_eq!(
            VerdictKind::from_description("Runtime Error (SIGSEGV)").to_string(),
            "Runtime Error (SIGSEGV)"
        );
    }

    #[test]
    fn descriptions_round_trip() {
        for v in [
            Accepted,
            AcceptedWithWarnings,
            WrongAnswer,
            TimeLimitExceeded,
            MemoryLimitExceeded,
            RuntimeError(None),
            RuntimeError(Some("NZEC".into())),
            InternalError,
            CompilationError,
            UnknownError,
            Timeout,
            JudgeApiError,
            Cancelled,
            PartialAccepted,
            InQueue,
            Processing,
        ] {
            assert_eq!(VerdictKind::from_description(&v.to_string()), v);
        }
    }

    #[test]
    fn unknown_strings_map_to_unknown_error() {
        assert_eq!(VerdictKind::from_description("Presentation Error"), UnknownError);
        assert_eq!("".parse::<VerdictKind>().unwrap(), UnknownError);
    }

    #[test]
    fn worst_prefers_first_of_equal_rank() {
        let verdicts = [Accepted, Timeout, JudgeApiError, WrongAnswer];
        assert_eq!(VerdictKind::worst(&verdicts), Some(&Timeout));
        assert_eq!(VerdictKind::worst(&[]), None);
    }

    #[test]
    fn serializes_as_description() {
        let json = serde_json::to_string(&TimeLimitExceeded).unwrap();
        assert_eq!(json, "\"Time Limit Exceeded\"");
        let back: VerdictKind = serde_json::from_str("\"Runtime Error (SIGFPE)\"").unwrap();
        assert_eq!(back, RuntimeError(Some("SIGFPE".into())));
    }
}
