use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    cond: Condvar,
    closed: Mutex<bool>,
}

/// Fixed-size pool of worker threads pulling closures off one bounded FIFO,
/// the Rust translation of the original project's `ThreadPool` (shared
/// `Pool{mtx, cond, isClosed, tasks}` plus detached worker threads).
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be non-zero");
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            closed: Mutex::new(false),
        });

        let workers = (0..worker_count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || Self::run(shared))
            })
            .collect();

        Self { shared, workers }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    drop(queue);
                    task();
                    break;
                }
                if *shared.closed.lock().unwrap() {
                    return;
                }
                queue = shared.cond.wait(queue).unwrap();
            }
        }
    }

    /// Enqueues `task` and wakes exactly one idle worker. Silently refuses
    /// (drops the task) once the pool has been shut down.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if *self.shared.closed.lock().unwrap() {
            return;
        }
        self.shared.queue.lock().unwrap().push_back(Box::new(task));
        self.shared.cond.notify_one();
    }

    /// Signals every worker to exit once its current queue drains, then
    /// joins them. Idempotent.
    pub fn shutdown(&mut self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.cond.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn submitted_tasks_run_in_submission_order_on_single_worker() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap());
        }
        drop(tx);
        let results: Vec<i32> = rx.iter().collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn all_tasks_eventually_execute_with_multiple_workers() {
        let pool = WorkerPool::new(4);
        let (tx, rx) = mpsc::channel();
        for i in 0..20 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap());
        }
        drop(tx);
        let mut results: Vec<i32> = rx.iter().collect();
        results.sort_unstable();
        assert_eq!(results, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_stops_accepting_new_work() {
        let mut pool = WorkerPool::new(2);
        pool.shutdown();
        let (tx, _rx) = mpsc::channel::<()>();
        pool.submit(move || tx.send(()).unwrap());
        thread::sleep(Duration::from_millis(20));
        // No panic, no hang: task was dropped because the pool is closed.
    }
}
