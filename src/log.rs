//! Logging shims
//!
//! Every macro forwards to `defmt` when the `defmt` feature is on and expands to nothing
//! otherwise, so the interrupt paths carry no formatting cost in a release build.

#[collapse_debuginfo(yes)]
macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        {
            defmt::$level!($($arg)*);
        }
    };
}
pub(crate) use emit;

#[collapse_debuginfo(yes)]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log::emit!(trace, $($arg)*)
    };
}
pub(crate) use trace;

#[collapse_debuginfo(yes)]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log::emit!(debug, $($arg)*)
    };
}
pub(crate) use debug;

#[collapse_debuginfo(yes)]
macro_rules! warni {
    ($($arg:tt)*) => {
        $crate::log::emit!(warn, $($arg)*)
    };
}
pub(crate) use warni as warn;
