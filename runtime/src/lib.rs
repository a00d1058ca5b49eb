// Copyright 2026 Marketsweep Contributors
// SPDX-License-Identifier: MIT

//! Marketsweep runtime library — drives a Chromium tab through a
//! marketplace, intercepts its API traffic and syncs the listings found.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod cli;
pub mod config;
pub mod events;
pub mod intercept;
pub mod orchestrator;
pub mod page;
pub mod renderer;
pub mod summary;
pub mod sync;
