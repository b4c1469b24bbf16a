// SPDX-FileCopyrightText: © 2025 Dataflow Node Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A process-wide background worker for deferred cleanup work.
//!
//! This is deliberately not a thread pool: the jobs it runs (resolving a
//! deferred [`crate::receive_result::ReceiveResult`], walking a
//! connector's teardown cascade) are short, and running them off the
//! caller's stack is the only property that matters — it breaks the
//! recursive-lock cycle a `transactional()` upgrade or a `connect` cascade
//! would otherwise risk if it tried to finish the job inline.

use std::sync::mpsc::{self, Sender};
use std::sync::OnceLock;
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

fn sender() -> &'static Sender<Job> {
    static SENDER: OnceLock<Sender<Job>> = OnceLock::new();
    SENDER.get_or_init(|| {
        let (tx, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("dataflow-node-cleanup".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .expect("failed to spawn cleanup worker thread");
        tx
    })
}

/// Schedules `f` to run on the cleanup worker. If the worker has somehow
/// gone away (it never exits under normal operation), the job is dropped
/// rather than panicking the caller — losing a deferred cleanup is
/// preferable to crashing the thread that triggered it.
pub fn enqueue_cleanup(f: impl FnOnce() + Send + 'static) {
    let _ = sender().send(Box::new(f));
}

#[cfg(test)]
mod tests {
    use super::enqueue_cleanup;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_off_the_caller_thread() {
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        enqueue_cleanup(move || {
            tx.send(std::thread::current().id()).unwrap();
        });
        let worker = rx.recv_timeout(Duration::from_secs(1)).expect("cleanup job ran");
        assert_ne!(worker, caller);
    }
}
