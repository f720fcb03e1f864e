use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{JobStore, StoreError, UpdateOutcome};
use crate::state_machine::{Job, JobId, JobStatus, StateMachine, StatusUpdate};

/// Stores one pretty-printed JSON document per job below `root`.
///
/// Writes go to a temporary file that is renamed into place, and conditional updates
/// are serialized through an async mutex, so concurrent writers inside one process
/// observe compare-and-swap semantics.
///
/// The mutex belongs to this handle only. Separate processes, or two handles opened on
/// the same `root`, are not excluded from each other: each update still reads the
/// latest file, so sequential writers conflict correctly, but truly concurrent
/// read-check-rename sequences from different handles can both apply. Give each jobs
/// directory a single writing process.
pub struct FileJobStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: JobId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.path_for(job.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.path_for(job.id)).await? {
            return Err(StoreError::AlreadyExists(job.id));
        }
        self.write(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.read(id).await
    }

    async fn update_if_status_equals(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut job = self.read(id).await?.ok_or(StoreError::NotFound(id))?;

        if job.status != expected {
            return Ok(UpdateOutcome::Conflict(job));
        }

        StateMachine::apply(&mut job, update, Utc::now())?;
        self.write(&job).await?;
        Ok(UpdateOutcome::Applied(job))
    }
}
