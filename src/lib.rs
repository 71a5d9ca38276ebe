// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Library root.
//!
//! # Crate Architecture
//!
//! ```text
//!                       repository
//!        apply / commit / push / fetch-and-reset
//!                 |                    |
//!        +--------+--------+           v
//!        v                 v        remote ── retry
//!   transformer          state     shell / memory
//!   runner + ops     snapshot API
//!        |                 |
//!        +--------+--------+
//!                 v
//!        ,-----------------,        ,----------,
//!        |  fs (TreeFs)    |        |    db    |
//!        '--------+--------'        '----------'
//!                 v
//!        odb  gix / memory / layered
//!
//!   +-----------------------------------------+
//!   |  foundation  config, error, logging,    |
//!   |              valid                      |
//!   +-----------------------------------------+
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod fs;
pub mod logging;
pub mod odb;
pub mod remote;
pub mod repository;
pub mod retry;
pub mod state;
pub mod transformer;
pub mod valid;

pub use repository::Repository;
