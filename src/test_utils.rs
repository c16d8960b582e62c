/// Routes `tracing` output through the test harness so it shows up for
/// failing tests only.
pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
