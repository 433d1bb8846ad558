//! Segment Writer
//!
//! One thread per segment owns the append handle and drains a request queue,
//! so appends from concurrent callers never interleave.

use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, SegKvError};

use super::index::SegmentIndex;

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteAck {
    /// Offset of the record's first byte
    pub(crate) offset: u64,
    pub(crate) written: usize,
}

struct WriteRequest {
    key: String,
    record: Bytes,
    reply: Sender<io::Result<WriteAck>>,
}

/// Handle to a segment's writer thread
///
/// Dropping the last request sender ends the thread once the queue drains;
/// `shutdown` does that and waits for it.
pub(crate) struct SegmentWriter {
    requests: RwLock<Option<Sender<WriteRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SegmentWriter {
    /// Start the writer thread for `file`
    pub(crate) fn spawn(
        file: File,
        index: Arc<SegmentIndex>,
        sync_writes: bool,
        name: &str,
    ) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name(format!("segkv-writer-{}", name))
            .spawn(move || run(file, rx, index, sync_writes))?;

        Ok(Self {
            requests: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a record and block until it is on disk and indexed
    pub(crate) fn submit(&self, key: String, record: Bytes) -> Result<WriteAck> {
        let requests = self
            .requests
            .read()
            .clone()
            .ok_or(SegKvError::SegmentClosed)?;

        let (reply_tx, reply_rx) = channel::bounded(1);
        requests
            .send(WriteRequest {
                key,
                record,
                reply: reply_tx,
            })
            .map_err(|_| SegKvError::SegmentClosed)?;
        drop(requests);

        let ack = reply_rx.recv().map_err(|_| SegKvError::SegmentClosed)??;
        Ok(ack)
    }

    /// Stop accepting writes and wait for queued ones to finish
    pub(crate) fn shutdown(&self) {
        self.requests.write().take();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("segment writer thread panicked");
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.requests.read().is_none()
    }
}

fn run(mut file: File, requests: Receiver<WriteRequest>, index: Arc<SegmentIndex>, sync_writes: bool) {
    let mut next_offset = index.cursor();

    for WriteRequest { key, record, reply } in requests.iter() {
        let outcome = match append(&mut file, &record, sync_writes) {
            Ok(()) => {
                let ack = WriteAck {
                    offset: next_offset,
                    written: record.len(),
                };
                index.record(key, ack.offset, ack.written as u64);
                next_offset += ack.written as u64;
                Ok(ack)
            }
            Err(e) => {
                // Part of the record may have landed; continue after it.
                if let Ok(metadata) = file.metadata() {
                    next_offset = metadata.len();
                    index.set_cursor(next_offset);
                }
                Err(e)
            }
        };

        // The caller may have given up waiting; nothing to do then.
        let _ = reply.send(outcome);
    }

    debug!(bytes = next_offset, "segment writer stopped");
}

fn append(file: &mut File, record: &[u8], sync_writes: bool) -> io::Result<()> {
    file.write_all(record)?;
    if sync_writes {
        file.sync_data()?;
    }
    Ok(())
}
