//! Knobs for computing and using weights. The command line fills these in;
//! library users can start from `Default`.

use domain::DomainPolicy;
use partition::HeatSources;
use skinning::BlendMode;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WeightOptions {
    pub domain: DomainPolicy,
    /// BFS rounds for the body partition; `None` runs to completion.
    pub max_partition_distance: Option<u32>,
    pub sources: HeatSources,
    /// Gauss-Seidel sweeps over the whole body after the exact solve.
    pub smoothing_iterations: u32,
    /// Weight 1 on the bone's domain, 0 elsewhere in the body; no diffusion.
    pub binary_weight: bool,
    /// Weights below this aren't kept in a `WeightMap`.
    pub min_weight: f32,
    pub threads: usize,
    pub poll_interval: Duration,
}

impl Default for WeightOptions {
    fn default() -> WeightOptions {
        WeightOptions {
            domain: DomainPolicy::Expansion { distance: 3 },
            max_partition_distance: None,
            sources: HeatSources::BoneTissue { min_label: 209 },
            smoothing_iterations: 10,
            binary_weight: false,
            min_weight: 0.0,
            threads: default_threads(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

pub fn default_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct PoseOptions {
    pub blend: BlendMode,
    /// Only blend bones this many parent links apart.
    pub max_filiation_degree: Option<u32>,
    /// Input labels at least this are foreground when interpolating.
    pub mask_min_label: u16,
    /// Largest sub-voxel neighbourhood, in half-voxel steps, splatted to
    /// close holes where the pose spreads voxels apart.
    pub max_splat_radius: u32,
}

impl Default for PoseOptions {
    fn default() -> PoseOptions {
        PoseOptions {
            blend: BlendMode::DualQuaternion { max_bones: 4 },
            max_filiation_degree: None,
            mask_min_label: 1,
            max_splat_radius: 64,
        }
    }
}
