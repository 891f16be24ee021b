//! # Worker
//!
//! A single background thread for the slow parts of history: replaying a layer and talking to spill storage.
//! Jobs are plain closures, queued in order and run one at a time. Every job answers on its own oneshot channel,
//! so the submitter decides whether to wait.

use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker thread is gone, and the job was not run.
    #[error("history worker has shut down")]
    Disconnected,
    /// The job panicked. The worker itself survives.
    #[error("history job panicked: {0}")]
    Panicked(String),
}

/// Cloneable handle to the worker thread. The thread exits once every handle is dropped.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    jobs: crossbeam::channel::Sender<Job>,
}
impl WorkerHandle {
    pub const THREAD_NAME: &'static str = "palimpsest history worker";
    /// Start the worker thread.
    /// # Errors
    /// If the OS refuses to spawn a thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (jobs, recv) = crossbeam::channel::unbounded::<Job>();
        std::thread::Builder::new()
            .name(Self::THREAD_NAME.to_owned())
            .spawn(move || {
                log::trace!("History worker started");
                // Live as long as there are jobs to serve
                for job in recv {
                    job();
                }
                log::trace!("History worker exiting");
            })?;
        Ok(Self { jobs })
    }
    /// Queue a job, returning a channel that receives its result.
    /// A panic within the job is caught and delivered in place of the result.
    /// # Errors
    /// If the worker thread has exited.
    pub fn submit<T, F>(
        &self,
        job: F,
    ) -> Result<oneshot::Receiver<Result<T, WorkerError>>, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (send, response) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            // The job owns all of its state, nothing it touched is observable after unwinding.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).map_err(
                |payload| {
                    let message = panic_message(payload.as_ref());
                    log::warn!("History job panicked: {message}");
                    WorkerError::Panicked(message)
                },
            );
            // Receiver may have hung up, that's their business.
            let _ = send.send(result);
        });
        self.jobs
            .send(wrapped)
            .map_err(|_| WorkerError::Disconnected)?;
        Ok(response)
    }
    /// Run a job on the worker and block until it completes.
    ///
    /// Must not be called from within a worker job, or from within an async runtime.
    /// # Errors
    /// If the worker is gone or the job panicked.
    pub fn run<T, F>(&self, job: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit(job)?
            .blocking_recv()
            .map_err(|_| WorkerError::Disconnected)?
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn runs_on_worker_thread() {
        let worker = WorkerHandle::spawn().unwrap();
        let name = worker
            .run(|| std::thread::current().name().map(ToOwned::to_owned))
            .unwrap();
        assert_eq!(name.as_deref(), Some(WorkerHandle::THREAD_NAME));
    }
    #[test]
    fn runs_in_order() {
        let worker = WorkerHandle::spawn().unwrap();
        let log = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let responses: Vec<_> = (0..16)
            .map(|i| {
                let log = log.clone();
                worker.submit(move || log.lock().push(i)).unwrap()
            })
            .collect();
        for response in responses {
            response.blocking_recv().unwrap().unwrap();
        }
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }
    #[test]
    fn survives_panic() {
        let worker = WorkerHandle::spawn().unwrap();
        let result = worker.run(|| -> u32 { panic!("oh no") });
        assert_eq!(result, Err(WorkerError::Panicked("oh no".to_owned())));
        // Still serving
        assert_eq!(worker.run(|| 4), Ok(4));
    }
}
