use evd_derive::evd_error;
use std::borrow::Cow;

#[evd_error]
pub enum SignalError {
    #[error("stop requested")]
    Stop,

    #[error("Internal error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn main() {
    let stop: Result<(), SignalError> = Err(SignalError::Stop);
    let stop = stop.context("ignored for marker variants").unwrap_err();
    assert_eq!(stop.to_string(), "stop requested");

    let failed: Result<(), SignalError> = Err(String::from("bad").into());
    let failed = failed.context("step 2").unwrap_err();
    assert_eq!(failed.to_string(), "Internal error (step 2): bad");
}
