// SPDX-License-Identifier: Apache-2.0

//! Domain services behind the HTTP surface. Each owns one slice of the
//! operations center and talks to the rest of the world through ports
//! (`OpsStore`, `ReplayTransport`, `ActionExecutor`, `HealthProbe`).

pub mod actions;
pub mod correlator;
pub mod dedup;
pub mod directory;
pub mod health;
pub mod replay;
pub mod timeline;
