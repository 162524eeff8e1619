use grid::{Grid, Voxel};
use skeleton::{BoneIndex, Label, BACKGROUND, bone_label};
use super::HeatProblem;

/// One bone's diffusion restricted to its domain. Heat sources in the
/// domain are fixed: 1 for the bone's own, 0 for any other bone's.
pub struct LocalProblem<'a> {
    pub domain: &'a Grid<bool>,
    pub sources: &'a Grid<Label>,
    pub hot: Label,
}

impl<'a> LocalProblem<'a> {
    pub fn new(domain: &'a Grid<bool>, sources: &'a Grid<Label>, bone: BoneIndex) -> LocalProblem<'a> {
        LocalProblem { domain, sources, hot: bone_label(bone) }
    }

    /// Whether the domain contains any of the bone's own sources.
    pub fn has_hot_source(&self) -> bool {
        self.domain.data().iter().zip(self.sources.data())
            .any(|(&d, &s)| d && s == self.hot)
    }
}

impl<'a> HeatProblem for LocalProblem<'a> {
    fn in_domain(&self, v: Voxel) -> bool {
        self.domain.get(v) == Some(true)
    }

    fn is_boundary(&self, v: Voxel) -> bool {
        self.sources.get(v).map(|l| l != BACKGROUND) == Some(true)
    }

    fn boundary_value(&self, v: Voxel) -> f32 {
        if self.sources.get(v) == Some(self.hot) { 1.0 } else { 0.0 }
    }
}

/// Diffusion over the whole body, every heat source fixed. The boundary
/// values don't depend on the bone: the relaxation only needs to know which
/// voxels to leave alone, and the per-bone values are written into each
/// field beforehand (see `bake_sources`).
pub struct GlobalProblem<'a> {
    pub partition: &'a Grid<Label>,
    pub sources: &'a Grid<Label>,
}

impl<'a> GlobalProblem<'a> {
    pub fn new(partition: &'a Grid<Label>, sources: &'a Grid<Label>) -> GlobalProblem<'a> {
        GlobalProblem { partition, sources }
    }

    /// Writes every source's value for `bone` into `heat`.
    pub fn bake_sources(&self, bone: BoneIndex, heat: &mut Grid<f32>) {
        let hot = bone_label(bone);
        for (h, &s) in heat.data_mut().iter_mut().zip(self.sources.data()) {
            if s != BACKGROUND {
                *h = if s == hot { 1.0 } else { 0.0 };
            }
        }
    }
}

impl<'a> HeatProblem for GlobalProblem<'a> {
    fn in_domain(&self, v: Voxel) -> bool {
        self.partition.get(v).map(|l| l != BACKGROUND) == Some(true)
    }

    fn is_boundary(&self, v: Voxel) -> bool {
        self.sources.get(v).map(|l| l != BACKGROUND) == Some(true)
    }

    fn boundary_value(&self, _: Voxel) -> f32 {
        // Per-bone values are baked in
        0.0
    }
}

#[test]
fn test_local() {
    use grid::{Geometry, Region};
    use heat::solve_exact;

    // A 7-voxel rod; bone 1's source at x = 0, bone 0's at x = 6 and the
    // domain stops at x = 5, so bone 0's source doesn't count.
    let region = Region::with_size([7, 1, 1]);
    let mut domain = Grid::new(region, Geometry::identity(), true);
    domain[[6, 0, 0]] = false;
    let mut sources = Grid::new(region, Geometry::identity(), BACKGROUND);
    sources[[0, 0, 0]] = bone_label(1);
    sources[[6, 0, 0]] = bone_label(0);

    let p0 = LocalProblem::new(&domain, &sources, 0);
    assert!(!p0.has_hot_source());
    let p1 = LocalProblem::new(&domain, &sources, 1);
    assert!(p1.has_hot_source());

    // Only one fixed voxel, zero flux elsewhere: constant 1
    let mut heat = Grid::new(region, Geometry::identity(), 0.0f32);
    solve_exact(&p1, &mut heat).unwrap();
    for x in 0..6 {
        assert!((heat[[x, 0, 0]] - 1.0).abs() < 1e-5);
    }
    assert_eq!(heat[[6, 0, 0]], 0.0);
}

#[test]
fn test_global() {
    use grid::{Geometry, Region};
    use heat::solve_iteratively;

    let region = Region::with_size([5, 1, 1]);
    let geo = Geometry::identity();
    let mut partition = Grid::new(region, geo, bone_label(0));
    partition[[4, 0, 0]] = BACKGROUND;
    let mut sources = Grid::new(region, geo, BACKGROUND);
    sources[[0, 0, 0]] = bone_label(0);
    sources[[3, 0, 0]] = bone_label(1);

    let problem = GlobalProblem::new(&partition, &sources);
    let mut heat = Grid::new(region, geo, 0.5f32);
    heat[[4, 0, 0]] = -1.0;
    problem.bake_sources(1, &mut heat);
    assert_eq!(heat.data(), &[0.0, 0.5, 0.5, 1.0, -1.0]);

    solve_iteratively(&problem, &mut heat, 200);
    assert!((heat[[1, 0, 0]] - 1.0 / 3.0).abs() < 1e-4);
    assert!((heat[[2, 0, 0]] - 2.0 / 3.0).abs() < 1e-4);
    assert_eq!(heat[[3, 0, 0]], 1.0);
    assert_eq!(heat[[4, 0, 0]], -1.0);
}
