#![macro_use]
#![allow(unused_macros)]

// Forwards to `log` when available, otherwise to `defmt`. With neither
// feature enabled the arguments are still evaluated by reference so callers
// do not trip unused-variable lints.
macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);

            #[cfg(all(feature = "defmt", not(feature = "log")))]
            ::defmt::$level!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            {
                $(let _ = &$x;)*
            }
        }
    };
}

macro_rules! log_trace {
    ($($arg:tt)*) => {
        log_at!(trace, $($arg)*)
    };
}

macro_rules! log_debug {
    ($($arg:tt)*) => {
        log_at!(debug, $($arg)*)
    };
}

macro_rules! log_info {
    ($($arg:tt)*) => {
        log_at!(info, $($arg)*)
    };
}

macro_rules! log_warn {
    ($($arg:tt)*) => {
        log_at!(warn, $($arg)*)
    };
}

macro_rules! log_error {
    ($($arg:tt)*) => {
        log_at!(error, $($arg)*)
    };
}
