//! Whereabouts: shared spaces where participants pin where they are.
//!
//! ARCHITECTURE
//! ============
//! `controller` owns the session and drives everything else. It reads and
//! writes spaces through a `store::RemoteSpaceStore`, keeps the known set in
//! a `registry::SpaceRegistry`, labels participants through an
//! `identity::IdentityDirectory`, and hands `authoring` forms an
//! `probe::ImageProbe` for new spaces. `routes` exposes the controller over
//! HTTP.

pub mod authoring;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod probe;
pub mod registry;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;
