// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane access: the collaborator trait, a kube-backed implementation
//! and an in-memory fake.

pub mod client;
pub mod control_plane;
pub mod fake;

pub use client::KubeControlPlane;
pub use control_plane::{ControlPlane, Listing, RawEvent, WatchStream};
pub use fake::FakeControlPlane;
