//! Fixed pool of worker threads draining a [`ConnectionQueue`].

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::server::queue::ConnectionQueue;

/// Type alias for the per-connection job a worker runs.
pub type JobHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Long-lived worker threads, each looping on pop → handle → drop.
///
/// The job owns the popped item; dropping it at the end of the job is what
/// closes a connection, so every handle is closed exactly once.
pub struct WorkerPool<T: Send + 'static> {
    queue: Arc<ConnectionQueue<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `size` workers on `queue`.
    pub fn spawn(size: usize, queue: Arc<ConnectionQueue<T>>, handler: JobHandler<T>) -> io::Result<Self> {
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(size),
        };

        for id in 0..size {
            let queue = pool.queue.clone();
            let handler = handler.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || Self::run(id, &queue, &handler));

            match spawned {
                Ok(worker) => pool.workers.push(worker),
                Err(e) => {
                    error!("Failed to start worker {id}: {e}");
                    pool.shutdown();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    fn run(id: usize, queue: &ConnectionQueue<T>, handler: &JobHandler<T>) {
        debug!("Worker {id} started");
        while let Some(item) = queue.pop() {
            handler(item);
        }
        debug!("Worker {id} exiting, queue closed");
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for every worker to finish its current job.
    pub fn shutdown(self) {
        self.queue.close();
        self.join();
    }

    /// Wait for the workers to exit. Only returns once the queue is closed.
    pub fn join(self) {
        for worker in self.workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!("{name} panicked");
            }
        }
    }
}
