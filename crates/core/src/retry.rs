// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry of transient store failures

use crate::error::StoreError;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `delay` (doubling) between
/// transient failures. Permanent errors are returned immediately.
pub(crate) async fn with_retries<T, F>(
    what: &'static str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut delay = delay;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    operation = what,
                    attempt,
                    attempts,
                    error = %e,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
