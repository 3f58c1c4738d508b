//! Tokio runtime backing the blocking driver calls
//!
//! tiberius is async-only while the driver seams block, so every network
//! operation is driven to completion on one shared runtime.

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or create the shared runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("sprocket-mssql-runtime")
            .build()
            .expect("Failed to create Tokio runtime for the SQL Server driver")
    })
}

/// Block the current thread until `future` completes.
///
/// Must not be called from within an async context.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    runtime().block_on(future)
}
