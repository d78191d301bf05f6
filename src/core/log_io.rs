use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::model::DomainEvent;

/// Tails a JSON-lines file of domain events appended by the indexer.
pub struct EventLogTailer {
    file: File,
    position: u64,
    path: PathBuf,
}

impl EventLogTailer {
    /// Opens the log positioned at its end; only events written afterwards are read.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let position = file.metadata()?.len();
        Ok(Self {
            file,
            position,
            path: path_ref.to_path_buf(),
        })
    }

    /// Complete lines written since the last call.
    ///
    /// A trailing line without a newline is left for the next call.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();

        self.file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(&self.file);
        let mut buffer = String::new();

        loop {
            buffer.clear();
            let bytes_read = reader.read_line(&mut buffer)?;
            if bytes_read == 0 || !buffer.ends_with('\n') {
                break;
            }
            self.position += bytes_read as u64;
            let line = buffer.trim_end_matches(&['\r', '\n'][..]).to_string();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        Ok(lines)
    }

    /// New well-formed events. Malformed lines are logged and skipped.
    pub fn read_new_events(&mut self) -> io::Result<Vec<DomainEvent>> {
        let events = self
            .read_new_lines()?
            .into_iter()
            .filter_map(|line| match serde_json::from_str(&line) {
                Ok(event) => Some(event),
                Err(e) => {
                    log::warn!("Skipping malformed event in {:?}: {}", self.path, e);
                    None
                }
            })
            .collect();
        Ok(events)
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turns an event log into a subscription stream, checking for new lines
/// every `period` until cancelled. Reads run on the blocking pool.
pub fn subscribe_event_log(
    mut tailer: EventLogTailer,
    period: Duration,
    token: CancellationToken,
) -> (mpsc::Receiver<DomainEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let read = tokio::task::spawn_blocking(move || {
                        let result = tailer.read_new_events();
                        (tailer, result)
                    })
                    .await;
                    let (returned, result) = match read {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::error!("Event log read task failed: {}", e);
                            return;
                        }
                    };
                    tailer = returned;
                    let events = match result {
                        Ok(events) => events,
                        Err(e) => {
                            log::warn!("Error reading event log {:?}: {}", tailer.path(), e);
                            continue;
                        }
                    };
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    const OFFER: &str = r#"{"kind":"direct_offer","trade_id":7,"maker_id":2,"taker_id":1,"expires_at":null}"#;

    #[test]
    fn test_tailer_reads_only_new_complete_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, format!("{}\n", OFFER)).unwrap();

        let mut tailer = EventLogTailer::open(&path).unwrap();
        assert!(tailer.read_new_events().unwrap().is_empty());

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", OFFER).unwrap();
        write!(file, "{{\"kind\":\"direct_o").unwrap();
        file.sync_all().unwrap();

        let events = tailer.read_new_events().unwrap();
        assert_eq!(events.len(), 1);

        // Finish the partial line
        writeln!(file, "ffer\",\"trade_id\":8,\"maker_id\":2,\"taker_id\":1}}").unwrap();
        file.sync_all().unwrap();
        let events = tailer.read_new_events().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::DirectOffer(offer) => assert_eq!(offer.trade_id, 8),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();
        let mut tailer = EventLogTailer::open(&path).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", OFFER).unwrap();
        file.sync_all().unwrap();

        assert_eq!(tailer.read_new_events().unwrap().len(), 1);

        tailer.rewind().unwrap();
        assert_eq!(tailer.read_new_events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();
        let tailer = EventLogTailer::open(&path).unwrap();
        let token = CancellationToken::new();
        let (mut rx, handle) = subscribe_event_log(tailer, Duration::from_millis(5), token.clone());

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", OFFER).unwrap();
        file.sync_all().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DomainEvent::DirectOffer(_)));

        token.cancel();
        handle.await.unwrap();
    }
}
