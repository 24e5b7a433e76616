// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relsem-sqlite: SQLite implementation of the relsem store traits

mod sql;
mod store;

pub use store::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
