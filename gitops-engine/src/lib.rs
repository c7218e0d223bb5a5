// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

#[allow(unused_extern_crates)]
extern crate self as gitops_engine;

pub mod cluster;
pub mod error;
pub mod plan;
pub mod pool;
pub mod secret;
pub mod state;
