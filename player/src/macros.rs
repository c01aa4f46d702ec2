//! Custom macros for reducing code repetition in movietex

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```ignore
/// log_and_continue!(playbin.set_state(gst::State::Null), "stop pipeline");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(filter, "linear", "nearest");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

/// Run a transport call against the loaded movie, or return `$default`
///
/// # Example
/// ```ignore
/// with_movie!(self, 0.0, |engine, movie| engine.rate(movie))
/// ```
#[macro_export]
macro_rules! with_movie {
    ($self:expr, $default:expr, |$engine:ident, $movie:ident| $body:expr) => {
        match $self.movie.native_handle() {
            Some($movie) => {
                let $engine = $self.movie.engine();
                $body
            }
            None => $default,
        }
    };
}
