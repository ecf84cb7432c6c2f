//! Power-rating core for college football: tiered feature loading,
//! z-score normalization, weighted offense/defense composites, per-team
//! HFA shrinkage, market-fitted team ratings, and the calibration gates
//! that decide whether any of it is wired correctly.

pub mod calibrate;
pub mod consensus;
pub mod features;
pub mod games;
pub mod hfa;
pub mod linalg;
pub mod mftr;
pub mod normalize;
pub mod prior;
pub mod ratings;
pub mod scenarios;
pub mod season;
pub mod store;
pub mod synthetic;
