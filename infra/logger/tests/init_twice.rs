use evd_logger::{LevelFilter, Logger, LoggerError, LoggerErrorExt};

#[test]
fn second_install_keeps_the_first_subscriber() {
    let first = Logger::builder()
        .name("evd-demo")
        .level(LevelFilter::WARN)
        .json()
        .init()
        .expect("nothing is installed yet");

    let err = Logger::builder()
        .name("evd-demo-replay")
        .level(LevelFilter::TRACE)
        .ansi(false)
        .init()
        .context("replay logger")
        .expect_err("the process already has a subscriber");

    assert!(matches!(&err, LoggerError::Subscriber { context: Some(ctx), .. } if ctx == "replay logger"));
    assert!(err.to_string().starts_with("Global subscriber already installed (replay logger): "));
    assert_eq!(first.name(), "evd-demo");

    tracing::warn!(target: "evd_demo", "still routed to the first subscriber");
}
