//! Logging macros that route through `defmt` when the `defmt` feature is
//! enabled, and are otherwise inert (their arguments are evaluated, to
//! avoid "unused variable" warnings at call sites, but nothing is printed).

#![allow(unused_macros)]

macro_rules! trace {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            defmt::trace!($($x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($($x)*,);
        }
    };
}

macro_rules! debug {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            defmt::debug!($($x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($($x)*,);
        }
    };
}

macro_rules! info {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            defmt::info!($($x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($($x)*,);
        }
    };
}

macro_rules! warn {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            defmt::warn!($($x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($($x)*,);
        }
    };
}

macro_rules! error {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            defmt::error!($($x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($($x)*,);
        }
    };
}

macro_rules! unwrap {
    ($e:expr) => {
        {
            #[cfg(feature = "defmt")]
            { defmt::unwrap!($e) }
            #[cfg(not(feature = "defmt"))]
            { $e.unwrap() }
        }
    };
    ($e:expr, $($x:tt)*) => {
        {
            #[cfg(feature = "defmt")]
            { defmt::unwrap!($e, $($x)*) }
            #[cfg(not(feature = "defmt"))]
            { $e.expect(core::concat!($($x)*)) }
        }
    };
}
