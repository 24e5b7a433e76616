// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod heartbeats;
pub mod hold;
pub mod init;
pub mod pool;
pub mod reap;
