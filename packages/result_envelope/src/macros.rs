//! Macros for signaling failures from inside a unit of work

/// Return a structured [`Failure`](crate::Failure) from the enclosing unit of work
///
/// `fail!(code = 7, "bad input: {}", field)` uses an explicit code;
/// `fail!("bad input")` uses the default code `-1`. The error is converted
/// with `.into()`, so the macro works in closures returning `anyhow::Result`
/// as well as in functions returning `Result<_, Failure>`.
#[macro_export]
macro_rules! fail {
    (code = $code:expr, $($arg:tt)+) => {
        return ::core::result::Result::Err(
            $crate::Failure::new($code, ::std::format!($($arg)+)).into(),
        )
    };
    ($($arg:tt)+) => {
        return ::core::result::Result::Err(
            $crate::Failure::unstructured(::std::format!($($arg)+)).into(),
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::Failure;

    fn parse_port(raw: &str) -> Result<u16, Failure> {
        match raw.parse::<u16>() {
            Ok(0) => fail!(code = 22, "port {} is reserved", raw),
            Ok(port) => Ok(port),
            Err(_) => fail!("not a port: {raw}"),
        }
    }

    #[test]
    fn test_fail_with_code() {
        assert_eq!(parse_port("0"), Err(Failure::new(22, "port 0 is reserved")));
    }

    #[test]
    fn test_fail_without_code() {
        assert_eq!(parse_port("http"), Err(Failure::new(-1, "not a port: http")));
        assert_eq!(parse_port("8080"), Ok(8080));
    }
}
