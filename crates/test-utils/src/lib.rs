pub mod builders;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=treewatch=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `condition` every 10ms until it holds. Panics after 5 seconds.
///
/// Background tasks (watch loops, event loops) make progress while this
/// sleeps, so it works on the single-threaded test runtime too.
pub async fn wait_for<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if polled.is_err() {
        panic!("timed out waiting for {what}");
    }
}

/// Yield to the runtime until pending background work had a chance to run.
///
/// Used to assert that something did *not* happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
