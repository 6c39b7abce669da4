use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

const CRATE_NAMES: &[&str] = &[
    "dsmbench",
    "dsmbench_fabric",
    "dsmbench_harness",
    "dsmbench_workload",
];

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// crates of this workspace. Calling it more than once is harmless.
///
/// # Example
///
/// ```
/// dsmbench_test::tracing::init();
/// ```
pub fn init() {
    let mut env_filter = EnvFilter::new("ERROR");

    // Add all internal modules with maximum log-level.
    for name in CRATE_NAMES {
        env_filter = env_filter.add_directive(format!("{name}=TRACE").parse().unwrap());
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

/// Runs `f` with a subscriber that records all logs of the calling thread.
///
/// Returns the result of `f` and the formatted log lines, without colors. The subscriber is only
/// active for the duration of the call and replaces the one installed by [`init`].
///
/// # Example
///
/// ```
/// let (answer, logs) = dsmbench_test::tracing::capture(|| 42);
/// assert_eq!(answer, 42);
/// assert!(logs.is_empty());
/// ```
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = Buffer::default();
    let subscriber = tracing_subscriber::fmt::fmt()
        .with_max_level(::tracing::Level::TRACE)
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();

    let result = ::tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap_or_else(PoisonError::into_inner);
    (result, String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Clone, Debug, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Buffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
