// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};

/// A fixed number of workers draining a shared queue into one result channel.
///
/// Workers never stop because a sibling produced an error; they only stop
/// once the queue is empty or the result receiver has been dropped.
pub struct WorkerPool<O> {
    results: mpsc::Receiver<O>,
    handles: Vec<JoinHandle<()>>,
}

impl<O> WorkerPool<O>
where
    O: Send + 'static,
{
    /// Spawn `parallelism` workers (at least one) applying `work` to every item
    pub fn spawn<I, F, Fut>(items: Vec<I>, parallelism: usize, work: F) -> Self
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send,
    {
        let capacity = items.len().max(1);
        let (queue_tx, queue_rx) = mpsc::channel::<I>(capacity);
        let (result_tx, results) = mpsc::channel::<O>(capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let work = Arc::new(work);

        let mut handles: Vec<JoinHandle<()>> = (0..parallelism.max(1))
            .map(|_| {
                let queue_rx = queue_rx.clone();
                let result_tx = result_tx.clone();
                let work = work.clone();

                tokio::spawn(async move {
                    loop {
                        let next = queue_rx.lock().await.recv().await;
                        let Some(item) = next else { break };

                        if result_tx.send(work(item).await).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        // Send work to the workers, closing the queue once everything is enqueued
        handles.push(tokio::spawn(async move {
            for item in items {
                if queue_tx.send(item).await.is_err() {
                    break;
                }
            }
        }));

        Self { results, handles }
    }

    /// Next finished result, in completion order. None once every worker is done.
    pub async fn next(&mut self) -> Option<O> {
        self.results.recv().await
    }

    /// Wait for every worker to exit, surfacing panics as errors
    pub async fn join(self) -> Result<()> {
        drop(self.results);
        for handle in self.handles {
            handle.await.map_err(|e| EngineError::Worker(e.to_string()))?;
        }
        Ok(())
    }
}
