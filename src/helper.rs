//! Shared I/O helpers.

use std::future::Future;
use std::io;
use std::time::Duration;

/// Await `fut` under a deadline, mapping expiry to `io::ErrorKind::TimedOut`.
///
/// Every protocol step runs under its own deadline; this keeps a stalled
/// peer from parking a session task forever.
pub(crate) async fn with_deadline<F, T>(limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "i/o deadline exceeded",
        )),
    }
}
