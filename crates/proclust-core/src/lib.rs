//! # Proclust Core Library
//!
//! A library for detecting and characterizing protein clusters in
//! molecular dynamics trajectories of protein-laden lipid bilayers.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear separation of
//! concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`SystemTopology`, `Frame`),
//!   periodic-boundary geometry, and loaders for the plain-text definition tables
//!   (species, cutoffs, size groups).
//!
//! - **[`engine`]: The Logic Core.** This stateful layer performs the per-frame analysis:
//!   cluster detection (graph connectivity or density), leaflet classification, and the
//!   streaming accumulation of contact and composition statistics.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing layer. It drives
//!   the engine over a whole trajectory and finalizes the accumulated state into the derived
//!   summary statistics consumed by reporting layers.

pub mod core;
pub mod engine;
pub mod workflows;
