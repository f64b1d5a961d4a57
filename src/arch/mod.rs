// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Platform backends.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m;
