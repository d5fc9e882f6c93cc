//! Wall-clock bound for in-process oracles.

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use super::{GradientOracle, Jacobian, OracleError};
use crate::deck::DeckEncoding;

/// Runs every evaluation of the inner oracle on a helper thread and gives up
/// after `limit`.
///
/// An evaluation that times out keeps running on its helper thread until it
/// finishes; its result is dropped.
#[derive(Debug)]
pub struct TimeLimited<O> {
    inner: Arc<O>,
    limit: Duration,
}

impl<O> TimeLimited<O> {
    pub fn new(inner: O, limit: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl<O> GradientOracle for TimeLimited<O>
where
    O: GradientOracle + 'static,
{
    fn num_features(&self) -> usize {
        self.inner.num_features()
    }

    fn evaluate_gradient(&self, encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        let encoding = encoding.clone();
        thread::Builder::new()
            .name("gradient-oracle".to_owned())
            .spawn(move || {
                // the receiver is gone if the evaluation timed out
                let _ = tx.send(inner.evaluate_gradient(&encoding));
            })
            .map_err(|e| OracleError::Unavailable {
                reason: format!("failed to spawn oracle thread: {e}"),
            })?;

        match rx.recv_timeout(self.limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(OracleError::Timeout { limit: self.limit }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(OracleError::Failed {
                reason: "gradient evaluation panicked".to_owned(),
            }),
        }
    }
}
