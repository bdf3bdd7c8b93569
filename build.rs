//! Build script for Robin
//!
//! Emits the `arm_architecture` and `arm_abi` cfgs, so the context switch
//! code can pick the right instruction sequence.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// Entry point to the build script
fn main() {
    arm_targets::process();
}

// End of File
