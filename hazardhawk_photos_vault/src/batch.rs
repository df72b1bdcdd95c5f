//! Ordered, fail-fast batch execution with progress and cancellation

use std::future::Future;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};
use crate::payload::CompressionHint;

/// Progress callback: `(completed, total)`
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// One plaintext item for a batch encryption
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub data: Vec<u8>,
    pub content_id: String,
    pub compression: CompressionHint,
}

impl BatchItem {
    pub fn new(data: Vec<u8>, content_id: impl Into<String>) -> Self {
        Self {
            data,
            content_id: content_id.into(),
            compression: CompressionHint::None,
        }
    }

    pub fn with_compression(mut self, compression: CompressionHint) -> Self {
        self.compression = compression;
        self
    }
}

/// Runs `op` over `items` with up to `concurrency` in flight
///
/// Results come back in input order. Progress fires once per completed item,
/// in order. The first error or a cancellation stops new items from starting;
/// items already in flight run to completion before the call returns.
pub(crate) async fn run_ordered<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    on_progress: Option<ProgressFn<'_>>,
    cancel: Option<&CancellationToken>,
    op: F,
) -> EngineResult<Vec<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let total = items.len();
    let halt = cancel
        .map(|token| token.child_token())
        .unwrap_or_else(CancellationToken::new);
    let mut results = Vec::with_capacity(total);
    let mut failure = None;

    let mut pending = stream::iter(items)
        .take_while(|_| future::ready(!halt.is_cancelled()))
        .map(op)
        .buffered(concurrency.max(1));

    while let Some(next) = pending.next().await {
        if failure.is_some() {
            continue;
        }
        match next {
            Ok(value) => {
                results.push(value);
                if let Some(report) = on_progress {
                    report(results.len(), total);
                }
            }
            Err(e) => {
                log::warn!("Batch aborted at item {}/{}: {}", results.len() + 1, total, e);
                halt.cancel();
                failure = Some(e);
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if results.len() < total {
        log::warn!("Batch cancelled after {}/{} items", results.len(), total);
        return Err(EngineError::Cancelled {
            completed: results.len(),
        });
    }
    Ok(results)
}
