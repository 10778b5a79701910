use anyhow::Context;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A fixed set of threads draining one bounded queue. `execute` blocks while
/// the queue is full, so a fast client cannot outrun the workers.
pub struct WorkerPool<J: Send + 'static> {
    tx: Option<SyncSender<J>>,
    handles: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn new<F>(size: usize, run: F) -> anyhow::Result<Self>
    where
        F: Fn(J) + Send + Sync + 'static,
    {
        let size = size.max(1);
        let (tx, rx) = mpsc::sync_channel::<J>(size);
        let rx = Arc::new(Mutex::new(rx));
        let run = Arc::new(run);

        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let rx = Arc::clone(&rx);
            let run = Arc::clone(&run);
            let handle = thread::Builder::new()
                .name(format!("gradebookd-worker-{i}"))
                .spawn(move || {
                    while let Some(job) = next_job(&rx) {
                        run(job);
                    }
                })
                .with_context(|| format!("failed to spawn worker {i}"))?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            handles,
        })
    }

    /// Hands `job` to the next free worker. Gives the job back if every
    /// worker has gone away.
    pub fn execute(&self, job: J) -> Result<(), J> {
        match &self.tx {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Closes the queue and waits for queued and running jobs to finish.
    pub fn join(mut self) {
        self.tx = None;
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

fn next_job<J>(rx: &Mutex<Receiver<J>>) -> Option<J> {
    let rx = match rx.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    rx.recv().ok()
}
