mod loader {
    use evd_derive::evd_error;
    use std::borrow::Cow;

    #[evd_error]
    pub(crate) enum LoadError {
        #[error("Parse error{}: {source}", format_context(context))]
        Parse { source: std::num::ParseIntError, context: Option<Cow<'static, str>> },
    }

    pub(crate) fn port(raw: &str) -> Result<u16, LoadError> {
        raw.parse::<u16>().context("parsing port")
    }
}

use loader::LoadErrorExt as _;

fn main() {
    assert_eq!(loader::port("8080").ok(), Some(8080));

    let err = loader::port("http").unwrap_err();
    assert!(err.to_string().starts_with("Parse error (parsing port): "));

    let rewrapped: Result<u16, _> = loader::port("x").context("outer");
    assert!(rewrapped.unwrap_err().to_string().starts_with("Parse error (outer): "));
}
