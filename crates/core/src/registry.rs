use crate::models::{PipelineProcess, ProcessStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Shared map of in-flight and recently finished runs, keyed by process id.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<String, PipelineProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PipelineProcess>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a new run. Returns `false` and leaves the registry untouched if the id is taken.
    pub fn create(&self, process: PipelineProcess) -> bool {
        let mut processes = self.lock();
        if processes.contains_key(&process.id) {
            return false;
        }
        processes.insert(process.id.clone(), process);
        true
    }

    pub fn get(&self, id: &str) -> Option<PipelineProcess> {
        self.lock().get(id).cloned()
    }

    /// Applies `mutate` to the entry and returns the resulting snapshot, or `None`
    /// when the entry is gone (purged or cancelled).
    pub fn update<F>(&self, id: &str, mutate: F) -> Option<PipelineProcess>
    where
        F: FnOnce(&mut PipelineProcess),
    {
        let mut processes = self.lock();
        let process = processes.get_mut(id)?;
        mutate(process);
        Some(process.clone())
    }

    /// Marks a live run cancelled and drops it from the registry.
    pub fn cancel(&self, id: &str) -> Option<PipelineProcess> {
        let mut process = self.lock().remove(id)?;
        if process.status.is_terminal() {
            return Some(process);
        }
        process.status = ProcessStatus::Cancelled;
        process.end_time = Some(Utc::now());
        Some(process)
    }

    pub fn purge(&self, id: &str) -> Option<PipelineProcess> {
        self.lock().remove(id)
    }

    /// Removes the entry after `retention`, unless the id was reused by a newer run.
    pub fn schedule_purge(&self, id: &str, started_at: DateTime<Utc>, retention: Duration) {
        let registry = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let mut processes = registry.lock();
            if processes
                .get(&id)
                .is_some_and(|process| process.start_time == started_at)
            {
                processes.remove(&id);
                debug!(process_id = %id, "purged finished process");
            }
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn process(id: &str) -> PipelineProcess {
        PipelineProcess {
            id: id.to_string(),
            start_time: Utc::now(),
            end_time: None,
            text_length: 3,
            document_checksum: String::new(),
            model: "gpt-4o".to_string(),
            stages: Vec::new(),
            current_stage_index: 0,
            completed_stages: 0,
            status: ProcessStatus::Initializing,
            estimated_duration: Duration::from_secs(3),
            result: None,
            error: None,
            validation: None,
            summary: None,
        }
    }

    #[test]
    fn create_rejects_duplicate_ids() {
        let registry = ProcessRegistry::new();
        assert!(registry.create(process("p1")));
        assert!(!registry.create(process("p1")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_returns_the_mutated_snapshot() {
        let registry = ProcessRegistry::new();
        registry.create(process("p1"));

        let snapshot = registry.update("p1", |process| process.status = ProcessStatus::Active);

        assert_eq!(snapshot.map(|process| process.status), Some(ProcessStatus::Active));
        assert!(registry.update("missing", |_| {}).is_none());
    }

    #[test]
    fn cancel_marks_and_removes_the_entry() {
        let registry = ProcessRegistry::new();
        registry.create(process("p1"));

        let cancelled = registry.cancel("p1");

        assert_eq!(cancelled.map(|process| process.status), Some(ProcessStatus::Cancelled));
        assert!(registry.is_empty());
        assert!(registry.update("p1", |_| {}).is_none());
    }

    #[tokio::test]
    async fn scheduled_purge_removes_the_entry_after_retention() {
        let registry = ProcessRegistry::new();
        let entry = process("p1");
        let started_at = entry.start_time;
        registry.create(entry);

        registry.schedule_purge("p1", started_at, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.get("p1").is_none());
    }

    #[tokio::test]
    async fn scheduled_purge_spares_a_reused_id() {
        let registry = ProcessRegistry::new();
        let stale_start = Utc::now() - chrono::Duration::seconds(60);
        registry.create(process("p1"));

        registry.schedule_purge("p1", stale_start, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.get("p1").is_some());
    }
}
