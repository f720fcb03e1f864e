use chrono::{DateTime, Utc};
use thiserror::Error;

use super::job::{Job, JobFailure, JobStatus, TranscriptResult};

/// A requested status change together with the fields it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The engine picked the job up.
    Start,
    /// Transcription succeeded.
    Complete {
        transcript: String,
        result: Option<TranscriptResult>,
    },
    /// The job ended in failure.
    Fail(JobFailure),
}

impl StatusUpdate {
    pub fn target(&self) -> JobStatus {
        match self {
            StatusUpdate::Start => JobStatus::Processing,
            StatusUpdate::Complete { .. } => JobStatus::Completed,
            StatusUpdate::Fail(_) => JobStatus::Failed,
        }
    }
}

/// A transition that was applied to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already terminal ({0}); no further transitions allowed")]
    Terminal(JobStatus),

    #[error("illegal transition {from} -> {to}")]
    Illegal { from: JobStatus, to: JobStatus },
}

/// Applies status updates to a `Job`, enforcing the lifecycle rules.
pub struct StateMachine;

impl StateMachine {
    /// Whether `from → to` is a legal edge of the lifecycle graph.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Apply `update` to `job` at time `now`.
    ///
    /// - `Start` sets `started_at`.
    /// - `Complete` stores the transcript and clears any error.
    /// - `Fail` stores the classified message and clears any transcript.
    /// - Both terminal updates set `finished_at`.
    ///
    /// The job is left untouched when the transition is rejected.
    pub fn apply(
        job: &mut Job,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = job.status;
        let to = update.target();

        if from.is_terminal() {
            return Err(TransitionError::Terminal(from));
        }
        if !Self::can_transition(from, to) {
            return Err(TransitionError::Illegal { from, to });
        }

        match update {
            StatusUpdate::Start => {
                job.started_at.get_or_insert(now);
            }
            StatusUpdate::Complete { transcript, result } => {
                job.transcript_text = Some(transcript);
                job.result = result;
                job.error_message = None;
                job.failure_class = None;
                job.finished_at.get_or_insert(now);
            }
            StatusUpdate::Fail(failure) => {
                job.error_message = Some(failure.message());
                job.failure_class = Some(failure.class);
                job.transcript_text = None;
                job.result = None;
                job.finished_at.get_or_insert(now);
            }
        }

        job.status = to;
        job.updated_at = now;

        Ok(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::job::FailureClass;
    use crate::storage::StorageRef;

    fn make_job() -> Job {
        Job::new(
            "call.wav".to_string(),
            StorageRef::new("file:///tmp/call.wav"),
            2_000_000,
            11.3,
        )
    }

    fn complete(text: &str) -> StatusUpdate {
        StatusUpdate::Complete {
            transcript: text.to_string(),
            result: None,
        }
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job();
        let now = Utc::now();

        let t = StateMachine::apply(&mut job, StatusUpdate::Start, now).unwrap();
        assert_eq!(
            t,
            Transition {
                from: JobStatus::Pending,
                to: JobStatus::Processing
            }
        );
        assert_eq!(job.started_at, Some(now));

        let later = now + chrono::Duration::seconds(5);
        let t = StateMachine::apply(&mut job, complete("hello world"), later).unwrap();
        assert_eq!(t.to, JobStatus::Completed);
        assert_eq!(job.transcript_text.as_deref(), Some("hello world"));
        assert!(job.error_message.is_none());
        assert_eq!(job.finished_at, Some(later));
        assert_eq!(job.updated_at, later);
    }

    #[test]
    fn terminal_states_never_change() {
        let mut job = make_job();
        let now = Utc::now();
        StateMachine::apply(&mut job, StatusUpdate::Start, now).unwrap();
        StateMachine::apply(&mut job, complete("first"), now).unwrap();
        let snapshot = job.clone();

        let err = StateMachine::apply(
            &mut job,
            StatusUpdate::Fail(JobFailure::new(FailureClass::EngineFailure, "late")),
            now + chrono::Duration::seconds(1),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::Terminal(JobStatus::Completed));
        assert_eq!(job, snapshot);

        let err = StateMachine::apply(&mut job, complete("second"), now).unwrap_err();
        assert_eq!(err, TransitionError::Terminal(JobStatus::Completed));
        assert_eq!(job.transcript_text.as_deref(), Some("first"));
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let mut job = make_job();
        let err = StateMachine::apply(&mut job, complete("skip"), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            }
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.transcript_text.is_none());
    }

    #[test]
    fn pending_can_fail_without_starting() {
        let mut job = make_job();
        let failure = JobFailure::new(FailureClass::ServiceUnavailable, "circuit open");
        StateMachine::apply(&mut job, StatusUpdate::Fail(failure), Utc::now()).unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_some());
        assert_eq!(
            job.error_message.as_deref(),
            Some("SERVICE_UNAVAILABLE: circuit open")
        );
        assert_eq!(job.failure_class, Some(FailureClass::ServiceUnavailable));
    }

    #[test]
    fn processing_cannot_restart() {
        let mut job = make_job();
        let first = Utc::now();
        StateMachine::apply(&mut job, StatusUpdate::Start, first).unwrap();

        let err = StateMachine::apply(
            &mut job,
            StatusUpdate::Start,
            first + chrono::Duration::seconds(3),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
        assert_eq!(job.started_at, Some(first));
    }

    #[test]
    fn failed_job_excludes_transcript() {
        let mut job = make_job();
        StateMachine::apply(&mut job, StatusUpdate::Start, Utc::now()).unwrap();
        StateMachine::apply(
            &mut job,
            StatusUpdate::Fail(JobFailure::new(FailureClass::SyncTimeout, "exceeded 120s")),
            Utc::now(),
        )
        .unwrap();

        assert!(job.transcript_text.is_none());
        assert!(job.result.is_none());
        assert!(job.error_message.as_deref().unwrap().starts_with("SYNC_TIMEOUT"));
    }

    #[test]
    fn transition_table() {
        use JobStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        let legal = [
            (Pending, Processing),
            (Pending, Failed),
            (Processing, Completed),
            (Processing, Failed),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    StateMachine::can_transition(from, to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }
}
