//! Volumetric skeletal skinning.
//!
//! Given a label volume of a body and a skeleton placed inside it, computes
//! one weight field per bone by heat diffusion, stores them sparsely, and
//! deforms the volume (or arbitrary points) by blending bone transforms
//! with those weights.
//!
//! The usual flow is
//!
//! 1. `skeleton::read_armature` for the bones and their poses,
//! 2. `pipeline::BodySetup` to rasterize the skeleton, partition the body
//!    among the bones and find the heat sources,
//! 3. `pipeline::compute_weights` to solve every bone on a worker pool,
//! 4. `pose::Poser` to deform through the resulting `weights::WeightMap`.

#![recursion_limit = "1024"] // for error_chain

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate cgmath;
extern crate json;
extern crate nalgebra;
extern crate nalgebra_sparse;
extern crate petgraph;
extern crate smallvec;

#[macro_use]
pub mod errors;
pub mod util;
pub mod grid;
pub mod skeleton;
pub mod partition;
pub mod domain;
pub mod heat;
pub mod weights;
pub mod skinning;
pub mod scheduler;
pub mod config;
pub mod pipeline;
pub mod pose;
pub mod io;

pub static VERSION: &'static str = env!("CARGO_PKG_VERSION");
