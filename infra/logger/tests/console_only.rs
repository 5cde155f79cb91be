use evd_logger::{LevelFilter, Logger};

#[test]
fn init_console_keeps_name() {
    let logger = Logger::builder()
        .name("integration-console")
        .ansi(false)
        .level(LevelFilter::INFO)
        .init()
        .expect("logger should initialize");

    tracing::info!(target: "integration", answer = 42, "console logging works");
    assert_eq!(logger.name(), "integration-console");
}
