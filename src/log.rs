//! Logging macros
//!
//! On the target these forward to [`defmt`](https://docs.rs/defmt). Host
//! builds (where the unit tests run) have no defmt global logger, so there
//! the arguments are evaluated and dropped.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::trace!($($arg)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($($arg)*,);
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::debug!($($arg)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($($arg)*,);
    }};
}

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        defmt::info!($($arg)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($($arg)*,);
    }};
}

// End of File
