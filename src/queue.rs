//! Serialized execution of index work.
//!
//! Everything that touches the [FieldIndex] goes through one [TaskQueue] drained one task at a
//! time. Redundant work is coalesced on push. Tasks that write documents wait for the metadata
//! cache to settle both before they start and before the queue moves on.

use std::collections::VecDeque;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

use crate::{
    error::BuildonomyError,
    event::VaultEvent,
    index::{FieldIndex, FieldWrite},
    store::FieldValueStore,
    vault::{DocumentStore, MetadataCache},
};

#[derive(Debug, Clone, PartialEq)]
pub enum IndexTask {
    FullIndex { force: bool },
    IndexFields,
    Event(VaultEvent),
    Write { path: String, writes: Vec<FieldWrite> },
}

impl IndexTask {
    /// Whether the task may write documents.
    pub fn writes(&self) -> bool {
        matches!(self, IndexTask::FullIndex { .. } | IndexTask::Write { .. })
    }
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<IndexTask>,
}

impl TaskQueue {
    pub fn new() -> TaskQueue {
        TaskQueue::default()
    }

    /// Queue `task` unless pending work already covers it.
    pub fn push(&mut self, task: IndexTask) {
        match &task {
            IndexTask::FullIndex { force } => {
                let force = *force;
                self.pending.retain(|t| *t != IndexTask::IndexFields);
                for pending in self.pending.iter_mut() {
                    if let IndexTask::FullIndex { force: f } = pending {
                        *f |= force;
                        tracing::debug!("Full index already queued, merged");
                        return;
                    }
                }
            }
            IndexTask::IndexFields => {
                if self
                    .pending
                    .iter()
                    .any(|t| matches!(t, IndexTask::FullIndex { .. } | IndexTask::IndexFields))
                {
                    return;
                }
            }
            IndexTask::Event(VaultEvent::Modified(_)) => {
                if self.pending.contains(&task) {
                    return;
                }
            }
            _ => {}
        }
        self.pending.push_back(task);
    }

    pub fn pop(&mut self) -> Option<IndexTask> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every pending task in order. A failing task is logged and does not stop the queue.
    ///
    /// Returns the number of tasks run.
    #[tracing::instrument(skip_all, fields(pending = self.pending.len()))]
    pub async fn drain<V, S>(&mut self, index: &mut FieldIndex<V, S>) -> usize
    where
        V: DocumentStore + MetadataCache,
        S: FieldValueStore,
    {
        let mut count = 0;
        while let Some(task) = self.pop() {
            count += 1;
            if let Err(e) = run_task(index, task).await {
                tracing::error!("Index task failed: {}", e);
            }
        }
        count
    }

    /// Serve tasks from `rx` until every sender is dropped.
    pub async fn run<V, S>(mut self, mut index: FieldIndex<V, S>, mut rx: UnboundedReceiver<IndexTask>)
    where
        V: DocumentStore + MetadataCache,
        S: FieldValueStore,
    {
        loop {
            if self.is_empty() {
                match rx.recv().await {
                    Some(task) => self.push(task),
                    None => break,
                }
            }
            // Pick up everything already sent so it can coalesce with what is queued.
            loop {
                match rx.try_recv() {
                    Ok(task) => self.push(task),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
            if let Some(task) = self.pop() {
                if let Err(e) = run_task(&mut index, task).await {
                    tracing::error!("Index task failed: {}", e);
                }
            }
        }
        self.drain(&mut index).await;
        tracing::info!("Index task queue closed");
    }
}

async fn run_task<V, S>(index: &mut FieldIndex<V, S>, task: IndexTask) -> Result<(), BuildonomyError>
where
    V: DocumentStore + MetadataCache,
    S: FieldValueStore,
{
    let writes = task.writes();
    if writes {
        index.wait_for_resolution().await?;
    }
    let result = match task {
        IndexTask::FullIndex { force } => index.full_index(force).await.map(|_| ()),
        IndexTask::IndexFields => {
            index.index_fields();
            Ok(())
        }
        IndexTask::Event(event) => index.handle_event(&event).await,
        IndexTask::Write { path, writes } => index.write_fields(&path, writes).await,
    };
    if writes {
        // The next task must see metadata of what was just written.
        index.wait_for_resolution().await?;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::IndexSettings, store::MemoryStore, tests::helpers::*, vault::MemoryVault};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_coalescing() {
        let mut queue = TaskQueue::new();
        queue.push(IndexTask::IndexFields);
        queue.push(IndexTask::Event(VaultEvent::Modified("a.md".into())));
        queue.push(IndexTask::Event(VaultEvent::Modified("a.md".into())));
        queue.push(IndexTask::Event(VaultEvent::Modified("b.md".into())));
        queue.push(IndexTask::FullIndex { force: false });
        queue.push(IndexTask::IndexFields);
        queue.push(IndexTask::FullIndex { force: true });
        assert_eq!(
            queue.pending.iter().cloned().collect::<Vec<IndexTask>>(),
            vec![
                IndexTask::Event(VaultEvent::Modified("a.md".into())),
                IndexTask::Event(VaultEvent::Modified("b.md".into())),
                IndexTask::FullIndex { force: true },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writes_wait_for_resolution() {
        init_logging();
        let vault = Arc::new(MemoryVault::new());
        vault.insert("notes/a.md", "---\nstatus: draft\n---\nbody\n");
        let mut settings = IndexSettings::default();
        settings.preset_fields = vec![input_decl("status")];
        let mut index = FieldIndex::new(vault.clone(), Arc::new(MemoryStore::new()), settings);
        index.index_fields();
        let status = index.field_path("notes/a.md", "status").unwrap();

        vault.hold_resolution();
        let gate = {
            let vault = vault.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                let untouched = vault.text("notes/a.md").unwrap().contains("status: draft");
                vault.release_resolution();
                untouched
            })
        };

        let mut queue = TaskQueue::new();
        queue.push(IndexTask::Write {
            path: "notes/a.md".into(),
            writes: vec![FieldWrite::set(status, json!("done"))],
        });
        assert_eq!(queue.drain(&mut index).await, 1);
        assert!(gate.await.unwrap());
        assert_eq!(
            vault.text("notes/a.md").unwrap(),
            "---\nstatus: done\n---\nbody\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_waits_after_write() {
        init_logging();
        let vault = Arc::new(MemoryVault::new());
        vault.insert("notes/a.md", "---\nstatus: draft\n---\nbody\n");
        let mut settings = IndexSettings::default();
        settings.preset_fields = vec![input_decl("status")];
        let mut index = FieldIndex::new(vault.clone(), Arc::new(MemoryStore::new()), settings);
        index.index_fields();
        let status = index.field_path("notes/a.md", "status").unwrap();

        vault.hold_on_write(true);
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let host = {
            let vault = vault.clone();
            let released = released.clone();
            tokio::spawn(async move {
                let mut resolution = vault.resolution();
                resolution.wait_for(|n| *n > 0).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                released.store(true, std::sync::atomic::Ordering::SeqCst);
                vault.release_resolution();
            })
        };

        let mut queue = TaskQueue::new();
        queue.push(IndexTask::Write {
            path: "notes/a.md".into(),
            writes: vec![FieldWrite::set(status, json!("done"))],
        });
        queue.push(IndexTask::IndexFields);
        assert_eq!(queue.drain(&mut index).await, 2);
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(vault.in_progress(), 0);
        host.await.unwrap();
        assert_eq!(
            vault.text("notes/a.md").unwrap(),
            "---\nstatus: done\n---\nbody\n"
        );
    }

    #[tokio::test]
    async fn test_run_serves_until_closed() {
        init_logging();
        let vault = Arc::new(MemoryVault::new());
        vault.insert("a.md", "plain\n");
        let index = FieldIndex::new(vault, Arc::new(MemoryStore::new()), IndexSettings::default());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(IndexTask::FullIndex { force: false }).unwrap();
        tx.send(IndexTask::Event(VaultEvent::Deleted("gone.md".into())))
            .unwrap();
        drop(tx);
        TaskQueue::new().run(index, rx).await;
    }
}
