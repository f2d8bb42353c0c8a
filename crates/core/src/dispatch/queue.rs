use super::{CommandPublisher, send_command};
use anyhow::Context;
use crate::{Command, ScheduledCommand};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// A journaled command this late is no longer worth sending: the booth has
/// moved on.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

/// A delayed command as written to the journal file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub command: Command,
    /// Wall-clock due time, milliseconds since the Unix epoch.
    pub fire_at_ms: u64,
}

struct Pending {
    due: Instant,
    seq: u64,
    entry: JournalEntry,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Sends booth commands now or after a delay.
///
/// A background worker owns the pending commands, so a scheduled command does
/// not depend on the request that produced it. With a journal configured the
/// pending set is mirrored to disk and picked up again by the next process.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<ScheduledCommand>,
}

impl CommandQueue {
    /// Spawns the worker. Must be called from within a tokio runtime.
    ///
    /// The worker first restores the journal, if any. It exits once every
    /// handle is dropped, nothing is pending and every publish has finished.
    pub fn start(
        publisher: Arc<dyn CommandPublisher>,
        topic: String,
        journal: Option<PathBuf>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            publisher,
            topic,
            journal,
            pending: BinaryHeap::new(),
            in_flight: JoinSet::new(),
            seq: 0,
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    pub fn submit(&self, command: ScheduledCommand) {
        if self.tx.send(command).is_err() {
            warn!(
                command = %command.command,
                "Command queue worker is gone, dropping command"
            );
        }
    }
}

struct Worker {
    publisher: Arc<dyn CommandPublisher>,
    topic: String,
    journal: Option<PathBuf>,
    pending: BinaryHeap<Reverse<Pending>>,
    /// Publishes that have been started but not finished.
    in_flight: JoinSet<()>,
    seq: u64,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ScheduledCommand>) {
        self.restore().await;

        let mut closed = false;
        loop {
            let next_due = self.pending.peek().map(|Reverse(p)| p.due);
            if closed && next_due.is_none() {
                break;
            }
            tokio::select! {
                msg = rx.recv(), if !closed => match msg {
                    Some(command) => self.accept(command).await,
                    None => closed = true,
                },
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    self.fire_due().await;
                }
                Some(_) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {}
            }
        }

        if !self.in_flight.is_empty() {
            debug!(count = self.in_flight.len(), "Waiting for in-flight publishes");
        }
        while self.in_flight.join_next().await.is_some() {}
        debug!("Command queue worker stopped");
    }

    async fn accept(&mut self, scheduled: ScheduledCommand) {
        match scheduled.delay {
            None => self.dispatch(scheduled.command),
            Some(delay) => {
                info!(
                    command = %scheduled.command,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling command"
                );
                let entry = JournalEntry {
                    command: scheduled.command,
                    fire_at_ms: now_ms() + delay.as_millis() as u64,
                };
                self.push(entry, Instant::now() + delay);
                self.persist().await;
            }
        }
    }

    fn push(&mut self, entry: JournalEntry, due: Instant) {
        self.seq += 1;
        self.pending.push(Reverse(Pending {
            due,
            seq: self.seq,
            entry,
        }));
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();
        let mut fired = false;
        while self.pending.peek().is_some_and(|Reverse(next)| next.due <= now) {
            if let Some(Reverse(due)) = self.pending.pop() {
                self.dispatch(due.entry.command);
                fired = true;
            }
        }
        if fired {
            self.persist().await;
        }
    }

    /// Publishing runs on its own task so a slow endpoint never holds up the
    /// timers.
    fn dispatch(&mut self, command: Command) {
        let publisher = Arc::clone(&self.publisher);
        let topic = self.topic.clone();
        self.in_flight.spawn(async move {
            send_command(publisher.as_ref(), command, &topic).await;
        });
    }

    async fn restore(&mut self) {
        let Some(path) = self.journal.clone() else {
            return;
        };
        let entries = match load_journal(&path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable command journal {}: {e:?}", path.display());
                return;
            }
        };
        let now = Instant::now();
        for (entry, wait) in restorable(entries, now_ms()) {
            info!(
                command = %entry.command,
                wait_ms = wait.as_millis() as u64,
                "Restored command from journal"
            );
            self.push(entry, now + wait);
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let Some(path) = &self.journal else {
            return;
        };
        let mut entries: Vec<&Pending> = self.pending.iter().map(|Reverse(p)| p).collect();
        entries.sort();
        let entries: Vec<&JournalEntry> = entries.into_iter().map(|p| &p.entry).collect();
        if let Err(e) = write_journal(path, &entries).await {
            warn!("Failed to write command journal {}: {e:?}", path.display());
        }
    }
}

/// Replaces the journal in one step: a crash mid-write leaves the previous
/// journal intact.
async fn write_journal(path: &Path, entries: &[&JournalEntry]) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(entries)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Reads the journal. A missing file is an empty journal.
pub async fn load_journal(path: &Path) -> anyhow::Result<Vec<JournalEntry>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Pairs each journaled command with how long to wait before sending it,
/// dropping the ones that are too late to matter.
fn restorable(entries: Vec<JournalEntry>, now_ms: u64) -> Vec<(JournalEntry, Duration)> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let overdue = now_ms.saturating_sub(entry.fire_at_ms);
            if overdue > STALE_AFTER.as_millis() as u64 {
                warn!(
                    command = %entry.command,
                    overdue_ms = overdue,
                    "Dropping stale journaled command"
                );
                return None;
            }
            let wait = Duration::from_millis(entry.fire_at_ms.saturating_sub(now_ms));
            Some((entry, wait))
        })
        .collect()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<Command>>,
    }

    impl RecordingPublisher {
        fn sent(&self) -> Vec<Command> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandPublisher for RecordingPublisher {
        async fn publish(&self, command: Command) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn entry(command: Command, fire_at_ms: u64) -> JournalEntry {
        JournalEntry {
            command,
            fire_at_ms,
        }
    }

    /// Takes a while to answer, like a push endpoint over the network.
    #[derive(Default)]
    struct SlowPublisher {
        inner: RecordingPublisher,
    }

    #[async_trait]
    impl CommandPublisher for SlowPublisher {
        async fn publish(&self, command: Command) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.publish(command).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_command_fires_after_its_delay() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (queue, _worker) = CommandQueue::start(publisher.clone(), "topic".into(), None);

        queue.submit(ScheduledCommand::after(
            Command::Capture,
            Duration::from_millis(2500),
        ));

        tokio::time::sleep(Duration::from_millis(2400)).await;
        assert!(publisher.sent().is_empty(), "capture must not fire early");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(publisher.sent(), vec![Command::Capture]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_command_goes_out_first() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (queue, _worker) = CommandQueue::start(publisher.clone(), "topic".into(), None);

        queue.submit(ScheduledCommand::now(Command::StartOver));
        queue.submit(ScheduledCommand::after(Command::Capture, Duration::from_secs(2)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(publisher.sent(), vec![Command::StartOver]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(publisher.sent(), vec![Command::StartOver, Command::Capture]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_fire_in_due_order_and_worker_drains() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (queue, worker) = CommandQueue::start(publisher.clone(), "topic".into(), None);

        queue.submit(ScheduledCommand::after(Command::Finish, Duration::from_secs(5)));
        queue.submit(ScheduledCommand::after(Command::Style, Duration::from_secs(1)));
        drop(queue);

        // The worker keeps running until the pending commands are sent.
        worker.await.unwrap();
        assert_eq!(publisher.sent(), vec![Command::Style, Command::Finish]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_waits_for_slow_publish_before_exiting() {
        // Arrange
        let publisher = Arc::new(SlowPublisher::default());
        let (queue, worker) = CommandQueue::start(publisher.clone(), "topic".into(), None);

        // Act
        queue.submit(ScheduledCommand::after(Command::Capture, Duration::from_secs(1)));
        drop(queue);
        worker.await.unwrap();

        // Assert
        assert_eq!(publisher.inner.sent(), vec![Command::Capture]);
    }

    #[tokio::test]
    async fn test_start_restores_journal_and_prunes_it() -> anyhow::Result<()> {
        // Arrange
        let dir = tempdir()?;
        let path = dir.path().join("commands.json");
        let journal = vec![
            entry(Command::Style, now_ms() - 60_000),
            entry(Command::Capture, now_ms() + 200),
        ];
        std::fs::write(&path, serde_json::to_vec(&journal)?)?;
        let publisher = Arc::new(RecordingPublisher::default());

        // Act
        let (queue, worker) =
            CommandQueue::start(publisher.clone(), "topic".into(), Some(path.clone()));
        drop(queue);
        worker.await?;

        // Assert
        assert_eq!(publisher.sent(), vec![Command::Capture]);
        assert!(load_journal(&path).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delayed_command_is_journaled() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("commands.json");
        let publisher = Arc::new(RecordingPublisher::default());
        let (queue, _worker) =
            CommandQueue::start(publisher.clone(), "topic".into(), Some(path.clone()));

        queue.submit(ScheduledCommand::after(Command::Capture, Duration::from_secs(60)));

        let mut journal = Vec::new();
        for _ in 0..100 {
            journal = load_journal(&path).await?;
            if !journal.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].command, Command::Capture);
        assert!(journal[0].fire_at_ms > now_ms());
        assert!(publisher.sent().is_empty());
        assert!(!temp_path(&path).exists());
        Ok(())
    }

    #[test]
    fn test_restore_drops_stale_and_keeps_recent_entries() {
        let now = 1_000_000;
        let entries = vec![
            entry(Command::Capture, now - 60_000),
            entry(Command::Style, now - 2_000),
            entry(Command::Finish, now + 1_500),
        ];

        let restored = restorable(entries, now);

        assert_eq!(
            restored,
            vec![
                (entry(Command::Style, now - 2_000), Duration::ZERO),
                (entry(Command::Finish, now + 1_500), Duration::from_millis(1_500)),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_journal_is_empty() {
        let dir = tempdir().unwrap();
        let journal = load_journal(&dir.path().join("absent.json")).await.unwrap();
        assert!(journal.is_empty());
    }
}
