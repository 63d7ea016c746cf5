//! WAL writer: a multi-producer, single-worker durable pipeline.
//!
//! Any number of threads call [`WalWriter::write`]; one worker thread
//! serializes their records into the segment store, fsyncing after each
//! one, and signals every submission's outcome back on a one-shot
//! channel. The submission queue is bounded, so a full queue
//! back-pressures producers instead of buffering without limit.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::config::WalConfig;
use crate::error::{Result, WalError};
use crate::record::LogRecord;
use crate::segments::SegmentStore;

struct Submission {
    record: LogRecord,
    done: mpsc::Sender<Result<()>>,
}

struct Queue {
    items: VecDeque<Submission>,
    /// Close has begun: producers parked on a full queue give up.
    shutting_down: bool,
    /// No further submissions can arrive: the worker drains and exits.
    input_closed: bool,
}

struct WriterState {
    closed: bool,
    /// Producers past the closed check that have not finished enqueueing.
    in_flight: usize,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Worker waits here for submissions (or queue close).
    work_ready: Condvar,
    /// Producers wait here for queue space (or shutdown).
    space_ready: Condvar,
    capacity: usize,

    state: Mutex<WriterState>,
    /// Close waits here for the in-flight count to drain.
    drained: Condvar,
}

/// Durable, thread-safe entry point of the WAL.
///
/// A successful [`write`](WalWriter::write) means the record's frame is on
/// the active segment and fsync'd. Submissions that observably complete
/// their enqueue in order land in the log in that order; racing
/// submissions have no relative ordering.
pub struct WalWriter {
    shared: Arc<Shared>,
    store: Arc<SegmentStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WalWriter {
    /// Open the segment directory and start the worker thread.
    pub fn open(dir: impl Into<PathBuf>, config: WalConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(SegmentStore::open(dir, &config)?);

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                items: VecDeque::with_capacity(config.submission_queue_size),
                shutting_down: false,
                input_closed: false,
            }),
            work_ready: Condvar::new(),
            space_ready: Condvar::new(),
            capacity: config.submission_queue_size,
            state: Mutex::new(WriterState {
                closed: false,
                in_flight: 0,
            }),
            drained: Condvar::new(),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            let store = Arc::clone(&store);
            thread::Builder::new()
                .name("flashlog-wal".into())
                .spawn(move || worker_loop(&shared, &store))?
        };

        Ok(WalWriter {
            shared,
            store,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Append one record durably.
    ///
    /// Blocks until the record is encoded, written, and fsync'd (or until
    /// the writer reports a failure for it). Returns [`WalError::Closed`]
    /// if the writer is shut down before the record could be enqueued.
    pub fn write(&self, record: LogRecord) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(WalError::Closed);
            }
            state.in_flight += 1;
        }

        let (done, outcome) = mpsc::channel();
        let enqueued = self.enqueue(Submission { record, done });

        {
            let mut state = self.shared.state.lock();
            state.in_flight -= 1;
            if state.in_flight == 0 {
                self.shared.drained.notify_all();
            }
        }

        if !enqueued {
            return Err(WalError::Closed);
        }

        // The worker signals every enqueued submission, even during
        // shutdown drain; a dead channel means it did not get the chance.
        outcome.recv().unwrap_or(Err(WalError::Closed))
    }

    /// Enqueue, blocking while the queue is full. Returns `false` when
    /// shutdown won the race and the submission was never enqueued.
    fn enqueue(&self, submission: Submission) -> bool {
        let mut queue = self.shared.queue.lock();
        while queue.items.len() >= self.shared.capacity {
            if queue.shutting_down {
                return false;
            }
            self.shared.space_ready.wait(&mut queue);
        }
        queue.items.push_back(submission);
        self.shared.work_ready.notify_one();
        true
    }

    /// Shut down the writer.
    ///
    /// Idempotent. New submissions are rejected immediately; producers
    /// parked on a full queue return [`WalError::Closed`]; everything
    /// already enqueued is drained, signaled, and durable before the
    /// worker exits and the segment store is closed.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        // Wake producers parked on a full queue; holding the queue lock
        // while notifying prevents a lost wakeup against a producer that
        // is between its capacity check and its wait.
        {
            let mut queue = self.shared.queue.lock();
            queue.shutting_down = true;
            self.shared.space_ready.notify_all();
        }

        // Producers in the closed-check → enqueue window either enqueue
        // (worker will signal them) or bail out via shutting_down.
        {
            let mut state = self.shared.state.lock();
            while state.in_flight > 0 {
                self.shared.drained.wait(&mut state);
            }
        }

        // No submission can arrive anymore; let the worker drain and exit.
        {
            let mut queue = self.shared.queue.lock();
            queue.input_closed = true;
            self.shared.work_ready.notify_all();
        }

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!(target: "flashlog::writer", "WAL worker thread panicked");
            }
        }

        debug!(target: "flashlog::writer", "WAL writer closed");
        self.store.close()
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(target: "flashlog::writer", %err, "error closing WAL on drop");
        }
    }
}

fn worker_loop(shared: &Shared, store: &SegmentStore) {
    loop {
        let submission = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(submission) = queue.items.pop_front() {
                    shared.space_ready.notify_one();
                    break submission;
                }
                if queue.input_closed {
                    return;
                }
                shared.work_ready.wait(&mut queue);
            }
        };

        let mut record = submission.record;
        let result = store.write(record.frame_len(), |file| record.encode(file));
        if let Err(err) = &result {
            // The error belongs to this submission alone; the worker
            // keeps serving the queue.
            error!(target: "flashlog::writer", %err, "failed to append record");
        }

        // A dropped receiver means the producer gave up on the outcome;
        // the record itself may still have been made durable.
        let _ = submission.done.send(result);
    }
}
