use std::fmt;
use std::str::FromStr;

use crate::ingest::{IngestError, Processed};
use crate::utils::IsTransient;

/// What the subscriber does with a message the pipeline could not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Acknowledge and forget it
    #[default]
    Drop,
    /// Leave transient store failures unacknowledged so the bus hands them out again
    Redeliver,
    /// Park the message on the dead-letter topic, then acknowledge it
    DeadLetter,
}

/// Action taken on the bus for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Commit,
    Redeliver,
    DeadLetter,
}

impl FailurePolicy {
    pub fn disposition(&self, outcome: &Result<Processed, IngestError>) -> Disposition {
        let Err(error) = outcome else {
            return Disposition::Commit;
        };

        match self {
            FailurePolicy::Drop => Disposition::Commit,
            FailurePolicy::Redeliver if error.is_transient() => Disposition::Redeliver,
            FailurePolicy::Redeliver => Disposition::Commit,
            FailurePolicy::DeadLetter => Disposition::DeadLetter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Drop => "drop",
            FailurePolicy::Redeliver => "redeliver",
            FailurePolicy::DeadLetter => "dead-letter",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(FailurePolicy::Drop),
            "redeliver" => Ok(FailurePolicy::Redeliver),
            "dead-letter" | "dead_letter" | "dlq" => Ok(FailurePolicy::DeadLetter),
            other => Err(format!(
                "unknown failure policy '{other}', expected drop, redeliver or dead-letter"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::ValidationError;
    use crate::store::StoreError;
    use std::time::Duration;

    fn ok() -> Result<Processed, IngestError> {
        Ok(Processed {
            order_uid: "A1".to_string(),
            item_count: 1,
        })
    }

    fn invalid() -> Result<Processed, IngestError> {
        Err(IngestError::Validation(ValidationError::MissingTrackNumber))
    }

    fn malformed() -> Result<Processed, IngestError> {
        Err(serde_json::from_slice::<serde_json::Value>(b"not json")
            .unwrap_err()
            .into())
    }

    fn store_timeout() -> Result<Processed, IngestError> {
        Err(IngestError::Store {
            order_uid: "A1".to_string(),
            source: StoreError::Timeout(Duration::from_secs(5)),
        })
    }

    fn store_missing() -> Result<Processed, IngestError> {
        Err(IngestError::Store {
            order_uid: "A1".to_string(),
            source: StoreError::NotFound("A1".to_string()),
        })
    }

    #[test]
    fn test_success_always_commits() {
        for policy in [
            FailurePolicy::Drop,
            FailurePolicy::Redeliver,
            FailurePolicy::DeadLetter,
        ] {
            assert_eq!(policy.disposition(&ok()), Disposition::Commit);
        }
    }

    #[test]
    fn test_drop_commits_every_failure() {
        let policy = FailurePolicy::Drop;
        assert_eq!(policy.disposition(&invalid()), Disposition::Commit);
        assert_eq!(policy.disposition(&malformed()), Disposition::Commit);
        assert_eq!(policy.disposition(&store_timeout()), Disposition::Commit);
    }

    #[test]
    fn test_redeliver_only_transient_store_failures() {
        let policy = FailurePolicy::Redeliver;
        assert_eq!(policy.disposition(&store_timeout()), Disposition::Redeliver);
        assert_eq!(policy.disposition(&store_missing()), Disposition::Commit);
        assert_eq!(policy.disposition(&invalid()), Disposition::Commit);
        assert_eq!(policy.disposition(&malformed()), Disposition::Commit);
    }

    #[test]
    fn test_dead_letter_every_failure() {
        let policy = FailurePolicy::DeadLetter;
        assert_eq!(policy.disposition(&invalid()), Disposition::DeadLetter);
        assert_eq!(policy.disposition(&malformed()), Disposition::DeadLetter);
        assert_eq!(policy.disposition(&store_timeout()), Disposition::DeadLetter);
    }

    #[test]
    fn test_parse() {
        assert_eq!("drop".parse::<FailurePolicy>(), Ok(FailurePolicy::Drop));
        assert_eq!(" Redeliver ".parse::<FailurePolicy>(), Ok(FailurePolicy::Redeliver));
        assert_eq!("dead-letter".parse::<FailurePolicy>(), Ok(FailurePolicy::DeadLetter));
        assert_eq!("dlq".parse::<FailurePolicy>(), Ok(FailurePolicy::DeadLetter));
        assert!("forever".parse::<FailurePolicy>().is_err());
    }
}
