//! Execution of independent per-cell work.
//!
//! Cells of one tier share nothing but read-only inputs, so they can be fused
//! in any order on any number of threads. `map` returns only after every item
//! has finished, which gives the barrier between consecutive tiers.

use crossbeam_channel::unbounded;

/// Runs a function over a batch of independent items.
pub trait Executor {
    /// Apply `f` to every item. Results come back in input order.
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync;
}

/// Runs everything on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        items.into_iter().map(f).collect()
    }
}

/// Fixed-size pool of scoped worker threads fed through a shared queue.
#[derive(Clone, Copy, Debug)]
pub struct ThreadPoolExecutor {
    threads: usize,
}

impl ThreadPoolExecutor {
    /// Pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// One worker per logical CPU.
    pub fn with_defaults() -> Self {
        Self::new(num_cpus::get())
    }

    /// `threads == 0` selects [`ThreadPoolExecutor::with_defaults`].
    pub fn from_config(threads: usize) -> Self {
        if threads == 0 {
            Self::with_defaults()
        } else {
            Self::new(threads)
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Executor for ThreadPoolExecutor {
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let count = items.len();
        if self.threads == 1 || count <= 1 {
            return SerialExecutor.map(items, f);
        }

        let (task_sender, task_receiver) = unbounded::<(usize, T)>();
        let (result_sender, result_receiver) = unbounded::<(usize, R)>();
        for task in items.into_iter().enumerate() {
            // The receiver lives until the end of this function.
            let _ = task_sender.send(task);
        }
        drop(task_sender);

        let f = &f;
        std::thread::scope(|scope| {
            for worker in 0..self.threads.min(count) {
                let receiver = task_receiver.clone();
                let sender = result_sender.clone();
                std::thread::Builder::new()
                    .name(format!("fusion-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        while let Ok((index, item)) = receiver.recv() {
                            if sender.send((index, f(item))).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("Failed to spawn fusion worker thread");
            }
            drop(result_sender);

            let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
            for (index, result) in result_receiver.iter() {
                slots[index] = Some(result);
            }
            slots.into_iter().flatten().collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_serial_preserves_order() {
        let out = SerialExecutor.map((0..10).collect(), |x: i32| x * x);
        assert_eq!(out, (0..10).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_pool_results_in_input_order() {
        let pool = ThreadPoolExecutor::new(4);
        let out = pool.map((0..200u64).collect(), |x| {
            // uneven work so completion order differs from input order
            std::thread::sleep(std::time::Duration::from_micros((200 - x) % 7 * 50));
            x * 3
        });
        assert_eq!(out, (0..200u64).map(|x| x * 3).collect::<Vec<_>>());
    }

    #[test]
    fn test_pool_uses_named_workers() {
        let pool = ThreadPoolExecutor::new(3);
        let names = Mutex::new(HashSet::new());
        pool.map((0..64).collect(), |_: i32| {
            let name = std::thread::current().name().map(str::to_string);
            names.lock().unwrap().insert(name);
        });
        let names = names.into_inner().unwrap();
        assert!(!names.is_empty());
        assert!(
            names
                .iter()
                .all(|n| n.as_deref().is_some_and(|n| n.starts_with("fusion-worker-")))
        );
    }

    #[test]
    fn test_pool_borrows_shared_input() {
        let shared = vec![1u64, 2, 3, 4, 5];
        let pool = ThreadPoolExecutor::new(2);
        let sums = pool.map(vec![1usize, 3, 5], |n| shared[..n].iter().sum::<u64>());
        assert_eq!(sums, vec![1, 6, 15]);
    }

    #[test]
    fn test_empty_and_thread_count() {
        let pool = ThreadPoolExecutor::new(0);
        assert_eq!(pool.threads(), 1);
        assert!(ThreadPoolExecutor::with_defaults().threads() >= 1);
        assert_eq!(ThreadPoolExecutor::from_config(5).threads(), 5);
        let out: Vec<i32> = ThreadPoolExecutor::new(4).map(Vec::new(), |x: i32| x);
        assert!(out.is_empty());
    }
}
