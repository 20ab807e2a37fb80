//! Process-level log sink.
//!
//! Library code only talks to the `log` facade. The host bootstrap calls
//! [`init`] once; later calls are no-ops.

/// Install `env_logger` with an `info` default, overridable through `RUST_LOG`.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
    {
        log::debug!("Logger initialized");
    }
}

/// Variant for tests: captures output through the test harness.
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
