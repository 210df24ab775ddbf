// Logging macros. They expand to `tracing` events when the `tracing`
// feature is enabled, and to nothing otherwise.
#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)+);
        }
    }
}

macro_rules! error {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::error!($($arg)+);
        }
    }
}

macro_rules! info {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::info!($($arg)+);
        }
    }
}

macro_rules! trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($arg)+);
        }
    }
}

macro_rules! trace_span {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        let _span = tracing::trace_span!($($arg)+).entered();
    }
}

macro_rules! warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)+);
        }
    }
}
