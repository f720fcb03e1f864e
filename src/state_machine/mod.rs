mod job;
mod state;

pub use job::{
    AuditRecord, FailureClass, Job, JobFailure, JobId, JobStatus, Segment, SpeakerSegment,
    TranscriptResult, WordAlignment,
};
pub use state::{StateMachine, StatusUpdate, Transition, TransitionError};
