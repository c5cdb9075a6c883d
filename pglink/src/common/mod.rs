//! Supporting utility macros.

/// Trace when `verbose` feature enabled.
macro_rules! verbose {
    ($($tt:tt)*) => {
        #[cfg(feature = "verbose")]
        tracing::trace!($($tt)*);
        #[cfg(not(feature = "verbose"))]
        $crate::common::fields!($($tt)*);
    };
}

/// Create and enter `Span` when `verbose` feature enabled.
macro_rules! span {
    ($($tt:tt)*) => {
        #[cfg(feature = "verbose")]
        let s = tracing::trace_span!($($tt)*);
        #[cfg(feature = "verbose")]
        let _s = s.enter();
        #[cfg(not(feature = "verbose"))]
        $crate::common::fields!($($tt)*);
    };
}

/// Borrow every field of a trace event or span, so they are used without `verbose`.
#[cfg_attr(feature = "verbose", allow(unused_macros))]
macro_rules! fields {
    () => { };
    ($msg:literal $(, $($rest:tt)*)?) => {
        $($crate::common::fields!($($rest)*);)?
    };
    ($name:ident = %$e:expr $(, $($rest:tt)*)?) => {
        let _ = &$e;
        $($crate::common::fields!($($rest)*);)?
    };
    ($name:ident = ?$e:expr $(, $($rest:tt)*)?) => {
        let _ = &$e;
        $($crate::common::fields!($($rest)*);)?
    };
    ($name:ident = $e:expr $(, $($rest:tt)*)?) => {
        let _ = &$e;
        $($crate::common::fields!($($rest)*);)?
    };
    (%$name:ident $(, $($rest:tt)*)?) => {
        let _ = &$name;
        $($crate::common::fields!($($rest)*);)?
    };
    (?$name:ident $(, $($rest:tt)*)?) => {
        let _ = &$name;
        $($crate::common::fields!($($rest)*);)?
    };
    ($name:ident $(, $($rest:tt)*)?) => {
        let _ = &$name;
        $($crate::common::fields!($($rest)*);)?
    };
}

/// Log an error when `log` feature enabled.
macro_rules! error {
    ($($tt:tt)*) => {{
        #[cfg(feature = "log")]
        log::error!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || format!($($tt)*);
    }};
}

/// Log a warning when `log` feature enabled.
macro_rules! warning {
    ($($tt:tt)*) => {{
        #[cfg(feature = "log")]
        log::warn!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || format!($($tt)*);
    }};
}

/// Log a debug record when `log` feature enabled.
macro_rules! debug {
    ($($tt:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || format!($($tt)*);
    }};
}

pub(crate) use verbose;
pub(crate) use span;
#[cfg_attr(feature = "verbose", allow(unused_imports))]
pub(crate) use fields;
pub(crate) use error;
pub(crate) use warning;
pub(crate) use debug;
