// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::{sync::oneshot, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::port::host::PortError;

/// Await a reply from the engine task, bounded by `limit` and `cancel`.
pub(super) async fn reply_with_timeout<T>(
    label: &'static str,
    rx: oneshot::Receiver<T>,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<T, PortError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PortError::Closed),
        res = timeout(limit, rx) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(_)) => Err(PortError::Closed),
                Err(_) => Err(PortError::Timeout(label)),
            }
        }
    }
}
