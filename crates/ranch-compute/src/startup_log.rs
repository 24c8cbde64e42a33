//! In-memory startup log
//!
//! Append-only buffer of provisioning and container output lines with a
//! broadcast channel for live followers. Kept in memory rather than a
//! shared log file: no filesystem, no cross-process truncation races.

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Lines kept per provisioning run before the oldest are dropped
const BUFFER_CAP: usize = 2000;

/// Broadcast channel capacity; slow followers miss lines, never block
const CHANNEL_CAP: usize = 256;

pub struct StartupLog {
    lines: RwLock<Vec<String>>,
    tx: broadcast::Sender<String>,
}

impl StartupLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAP);
        Self {
            lines: RwLock::new(Vec::new()),
            tx,
        }
    }

    /// Append a line and fan it out to followers
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        let mut lines = self.lines.write();
        if lines.len() >= BUFFER_CAP {
            lines.remove(0);
        }
        lines.push(line.clone());
        drop(lines);

        // No followers is fine
        let _ = self.tx.send(line);
    }

    /// Snapshot of the buffered lines
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.read().clone()
    }

    /// Follow new lines as they are appended
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Stream view of [`subscribe`](Self::subscribe), for SSE-style
    /// forwarding; lagged followers get a `BroadcastStreamRecvError`
    /// item instead of blocking the writer
    pub fn follow(&self) -> BroadcastStream<String> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Reset the buffer for a fresh provisioning run
    pub fn clear(&self) {
        self.lines.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }
}

impl Default for StartupLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_snapshot() {
        let log = StartupLog::new();
        log.append("[pull] layer 1/3");
        log.append("[pull] layer 2/3");

        let lines = log.snapshot();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[pull] layer 1/3");
    }

    #[tokio::test]
    async fn test_subscribers_receive_appends() {
        let log = StartupLog::new();
        let mut rx = log.subscribe();

        log.append("[start] Container started");
        assert_eq!(rx.recv().await.unwrap(), "[start] Container started");
    }

    #[tokio::test]
    async fn test_follow_yields_stream_items() {
        use futures::StreamExt;

        let log = StartupLog::new();
        let mut stream = log.follow();
        log.append("[setup] line");

        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item, "[setup] line");
    }

    #[tokio::test]
    async fn test_clear_resets_buffer() {
        let log = StartupLog::new();
        log.append("stale");
        log.clear();
        assert!(log.is_empty());
    }
}
