//! From a label volume and a skeleton to one weight field per bone.
//!
//! The body-wide steps run once: rasterize the bones, partition the body,
//! find the heat sources. Then each bone gets a job on the scheduler which
//! builds the bone's domain, solves the diffusion exactly there, and relaxes
//! the result over the whole body. Finished fields come back to the calling
//! thread over a channel, so the consumer (writing files, filling a
//! `WeightMap`) needs no locking.

use config::WeightOptions;
use domain::compute_bone_domain;
use errors::{ErrorKind, Result};
use grid::{Grid, Scalar, Voxel};
use heat::{GlobalProblem, LocalProblem, Relaxation, solve_exact};
use partition::{compute_body_partition, compute_source_map};
use scheduler::{CancelToken, JobId, Scheduler};
use skeleton::{BoneIndex, Label, Skeleton, BACKGROUND, rasterize_skeleton};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use weights::WeightMap;

/// Everything the per-bone jobs share.
pub struct BodySetup {
    pub seeds: Vec<Vec<Voxel>>,
    pub partition: Grid<Label>,
    pub sources: Grid<Label>,
    relaxation: Relaxation,
}

impl BodySetup {
    pub fn new<T: Scalar>(labels: &Grid<T>, skel: &Skeleton, opts: &WeightOptions) -> BodySetup {
        let seeds = rasterize_skeleton(labels, skel);
        for (bone, voxels) in seeds.iter().enumerate() {
            if voxels.is_empty() {
                error!("{}", ErrorKind::EmptyRasterization(bone as BoneIndex));
            }
        }

        let partition = compute_body_partition(labels, &seeds, opts.max_partition_distance);
        let sources = compute_source_map(labels, &partition, &seeds, opts.sources);
        let relaxation = Relaxation::new(&GlobalProblem::new(&partition, &sources), partition.region());
        info!("body: {} voxels, {} free for relaxation",
            partition.data().iter().filter(|&&l| l != BACKGROUND).count(),
            relaxation.num_free_voxels(),
        );

        BodySetup { seeds, partition, sources, relaxation }
    }

    pub fn body_voxels(&self) -> Vec<Voxel> {
        self.partition.voxels()
            .filter(|&v| self.partition[v] != BACKGROUND)
            .collect()
    }
}

/// Weight field of one bone: -1 outside the body, the weight in [0, 1]
/// inside.
pub fn compute_bone_weight(
    setup: &BodySetup,
    skel: &Skeleton,
    bone: BoneIndex,
    opts: &WeightOptions,
    cancel: &CancelToken,
) -> Result<Grid<f32>> {
    let domain = compute_bone_domain(&setup.partition, skel, bone, opts.domain)?;
    cancel.check()?;

    let mut field = setup.partition.map(|&l| if l == BACKGROUND { -1.0f32 } else { 0.0 });

    if opts.binary_weight {
        for (f, &d) in field.data_mut().iter_mut().zip(domain.data()) {
            if d {
                *f = 1.0;
            }
        }
        return Ok(field);
    }

    let local = LocalProblem::new(&domain, &setup.sources, bone);
    if !local.has_hot_source() {
        bail!(ErrorKind::NoHeatSource(bone));
    }
    let n = solve_exact(&local, &mut field)?;
    debug!("bone {}: solved {} unknowns", bone, n);
    cancel.check()?;

    let global = GlobalProblem::new(&setup.partition, &setup.sources);
    global.bake_sources(bone, &mut field);
    for _ in 0..opts.smoothing_iterations {
        cancel.check()?;
        setup.relaxation.sweep(&mut field);
    }

    Ok(field)
}

/// Computes every bone's weight field on a pool of `opts.threads` workers,
/// handing each finished field to `on_field` on the calling thread.
///
/// Any failure (a job, `on_field`, or `abort` being raised) stops the whole
/// run: running jobs are killed, fields still in flight are dropped, and
/// the error is returned. Fields already handed over stay with the caller.
pub fn compute_weights<F>(
    setup: Arc<BodySetup>,
    skel: Arc<Skeleton>,
    opts: &WeightOptions,
    abort: &CancelToken,
    mut on_field: F,
) -> Result<()>
where
    F: FnMut(BoneIndex, Grid<f32>) -> Result<()>,
{
    let sched = Scheduler::new(opts.threads, opts.poll_interval);
    let (tx, rx) = mpsc::channel::<(BoneIndex, Grid<f32>)>();
    let mut job_bones: Vec<(JobId, BoneIndex)> = vec![];

    let mut deliver = |sched: &Scheduler| -> Result<()> {
        while let Ok((bone, field)) = rx.try_recv() {
            if sched.has_error() || abort.is_cancelled() {
                continue;
            }
            if let Err(e) = on_field(bone, field) {
                sched.kill_all();
                return Err(e);
            }
        }
        Ok(())
    };

    for bone in skel.indices() {
        if abort.is_cancelled() {
            sched.kill_all();
            break;
        }
        deliver(&sched)?;

        let (setup, skel, opts, tx) = (setup.clone(), skel.clone(), opts.clone(), tx.clone());
        let job = move |cancel: &CancelToken| -> Result<()> {
            let field = compute_bone_weight(&setup, &skel, bone, &opts, cancel)?;
            if tx.send((bone, field)).is_err() {
                bail!("bone {}: nobody is waiting for the weights", bone);
            }
            Ok(())
        };
        match sched.add_job(format!("bone {}", bone), job)? {
            Some(id) => job_bones.push((id, bone)),
            None => break,
        }
    }

    loop {
        deliver(&sched)?;
        if sched.running_count() == 0 {
            break;
        }
        if abort.is_cancelled() {
            sched.kill_all();
        }
        thread::sleep(sched.poll_interval());
    }
    deliver(&sched)?;

    if abort.is_cancelled() {
        bail!(ErrorKind::Cancelled);
    }
    let failures = sched.failures();
    // The root cause, not the jobs it took down with it
    let first = failures.iter()
        .find(|&&(_, ref msg)| msg != "killed")
        .or_else(|| failures.first());
    if let Some(&(id, ref msg)) = first {
        let bone = job_bones.iter()
            .find(|&&(job, _)| job == id)
            .map(|&(_, bone)| bone)
            .unwrap_or(id as BoneIndex);
        bail!(ErrorKind::JobFailed(bone, msg.clone()));
    }
    Ok(())
}

/// Computes all the weights of `labels` and packs them into a `WeightMap`
/// over the body voxels.
pub fn compute_weight_map<T: Scalar>(labels: &Grid<T>, skel: Arc<Skeleton>, opts: &WeightOptions) -> Result<WeightMap> {
    let setup = Arc::new(BodySetup::new(labels, &skel, opts));
    let mut map = WeightMap::new(&setup.body_voxels(), labels.region());
    map.set_min_weight(opts.min_weight);

    compute_weights(setup, skel, opts, &CancelToken::new(), |bone, field| {
        let n = map.insert_field(bone, &field);
        debug!("bone {}: {} weights kept", bone, n);
        Ok(())
    })?;
    Ok(map)
}

#[cfg(test)]
fn test_body() -> (Grid<u8>, Skeleton) {
    use cgmath::{Point3, Vector3, Matrix3, SquareMatrix};
    use grid::{Geometry, Region};
    use skeleton::Bone;

    // A 20x5x5 bar with a two-bone skeleton down the middle
    let geo = Geometry::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0), Matrix3::identity()).unwrap();
    let labels = Grid::new(Region::with_size([20, 5, 5]), geo, 1u8);
    let skel = Skeleton::new(vec![
        Bone { head: Point3::new(1.0, 2.0, 2.0), tail: Point3::new(9.0, 2.0, 2.0), radius: Some(3.0), parent: None },
        Bone { head: Point3::new(10.0, 2.0, 2.0), tail: Point3::new(18.0, 2.0, 2.0), radius: Some(3.0), parent: Some(0) },
    ]).unwrap();
    (labels, skel)
}

#[cfg(test)]
fn test_options() -> WeightOptions {
    use partition::HeatSources;
    use std::time::Duration;
    WeightOptions {
        sources: HeatSources::Skeleton,
        smoothing_iterations: 50,
        threads: 2,
        poll_interval: Duration::from_millis(1),
        ..WeightOptions::default()
    }
}

#[test]
fn test_bone_weights() {
    let (labels, skel) = test_body();
    let opts = test_options();
    let setup = BodySetup::new(&labels, &skel, &opts);

    let w0 = compute_bone_weight(&setup, &skel, 0, &opts, &CancelToken::new()).unwrap();
    let w1 = compute_bone_weight(&setup, &skel, 1, &opts, &CancelToken::new()).unwrap();

    // Hot on its own skeleton, cold on the other's
    assert_eq!(w0[[5, 2, 2]], 1.0);
    assert_eq!(w0[[15, 2, 2]], 0.0);
    assert_eq!(w1[[15, 2, 2]], 1.0);
    for v in labels.voxels() {
        assert!(w0[v] >= 0.0 && w0[v] <= 1.0 + 1e-6);
        // The two fields add up to one
        assert!((w0[v] + w1[v] - 1.0).abs() < 1e-4);
    }
    // Each bone dominates the end of the bar it runs through
    assert!(w0[[8, 0, 0]] > w1[[8, 0, 0]]);
    assert!(w0[[12, 4, 4]] < w1[[12, 4, 4]]);
    assert!(w0[[0, 0, 0]] > w0[[19, 4, 4]]);
}

#[test]
fn test_cancelled() {
    let (labels, skel) = test_body();
    let opts = test_options();
    let setup = BodySetup::new(&labels, &skel, &opts);
    let cancel = CancelToken::new();
    cancel.cancel();
    match compute_bone_weight(&setup, &skel, 0, &opts, &cancel) {
        Err(::errors::Error(ErrorKind::Cancelled, _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_binary() {
    use domain::DomainPolicy;
    let (labels, skel) = test_body();
    let opts = WeightOptions { binary_weight: true, domain: DomainPolicy::Envelope, ..test_options() };
    let setup = BodySetup::new(&labels, &skel, &opts);
    let w0 = compute_bone_weight(&setup, &skel, 0, &opts, &CancelToken::new()).unwrap();
    assert_eq!(w0[[0, 0, 0]], 1.0);
    assert_eq!(w0[[19, 0, 0]], 0.0);
    assert!(w0.data().iter().all(|&w| w == 0.0 || w == 1.0));
}

#[test]
fn test_weight_map() {
    let (labels, skel) = test_body();
    let map = compute_weight_map(&labels, Arc::new(skel), &test_options()).unwrap();
    assert_eq!(map.num_columns(), 20 * 5 * 5);

    let mut out = [0.0f32; 2];
    map.get([2, 2, 2], &mut out);
    assert_eq!(out, [1.0, 0.0]);
    let best = map.get([12, 1, 3], &mut out);
    assert_eq!(best.bone, 1);
    // The weights are a partition of unity (up to the relaxation's error)
    assert!((out[0] + out[1] - 1.0).abs() < 0.05);
}

#[test]
fn test_failing_bone() {
    use cgmath::Point3;
    use skeleton::Bone;

    let (labels, skel) = test_body();
    // Third bone sticks out of the volume, so it gets no voxels
    let mut bones = skel.bones().to_vec();
    bones.push(Bone { head: Point3::new(5.0, 2.0, 2.0), tail: Point3::new(50.0, 2.0, 2.0), radius: None, parent: Some(0) });
    let skel = Arc::new(Skeleton::new(bones).unwrap());

    let opts = test_options();
    let setup = Arc::new(BodySetup::new(&labels, &skel, &opts));
    let mut delivered = vec![];
    let res = compute_weights(setup, skel, &opts, &CancelToken::new(), |bone, _| {
        delivered.push(bone);
        Ok(())
    });
    match res {
        Err(::errors::Error(ErrorKind::JobFailed(2, _), _)) => (),
        r => panic!("unexpected {:?}", r),
    }
    assert!(!delivered.contains(&2));
}

#[test]
fn test_abort_while_running() {
    let (labels, skel) = test_body();
    let skel = Arc::new(skel);
    let opts = test_options();
    let setup = Arc::new(BodySetup::new(&labels, &skel, &opts));

    // The consumer gives up as soon as the first field arrives
    let abort = CancelToken::new();
    let trigger = abort.clone();
    let mut delivered = vec![];
    let res = compute_weights(setup.clone(), skel.clone(), &opts, &abort, |bone, _| {
        delivered.push(bone);
        trigger.cancel();
        Ok(())
    });
    match res {
        Err(::errors::Error(ErrorKind::Cancelled, _)) => (),
        r => panic!("unexpected {:?}", r),
    }
    assert_eq!(delivered.len(), 1);

    // Already raised: nothing is delivered
    let mut num_delivered = 0;
    let res = compute_weights(setup, skel, &opts, &abort, |_, _| {
        num_delivered += 1;
        Ok(())
    });
    match res {
        Err(::errors::Error(ErrorKind::Cancelled, _)) => (),
        r => panic!("unexpected {:?}", r),
    }
    assert_eq!(num_delivered, 0);
}

/// Both fields are in [0, 1] over the body, 1 on the bone's own heat
/// sources and 0 on the other bone's.
#[cfg(test)]
fn check_two_bone_fields(setup: &BodySetup, fields: &[Grid<f32>; 2]) {
    use skeleton::label_bone;

    let mut num_sources = [0; 2];
    for v in setup.partition.voxels() {
        for w in fields.iter() {
            assert!(w[v] >= 0.0 && w[v] <= 1.0 + 1e-6, "weight {} at {:?}", w[v], v);
        }
        if let Some(bone) = label_bone(setup.sources[v]) {
            let bone = bone as usize;
            num_sources[bone] += 1;
            assert_eq!(fields[bone][v], 1.0);
            assert_eq!(fields[1 - bone][v], 0.0);
        }
    }
    assert!(num_sources[0] > 0 && num_sources[1] > 0);
}

#[test]
fn test_envelope_diffusion() {
    use domain::DomainPolicy;

    let (labels, skel) = test_body();
    let opts = WeightOptions { domain: DomainPolicy::Envelope, ..test_options() };
    let setup = BodySetup::new(&labels, &skel, &opts);
    let w0 = compute_bone_weight(&setup, &skel, 0, &opts, &CancelToken::new()).unwrap();
    let w1 = compute_bone_weight(&setup, &skel, 1, &opts, &CancelToken::new()).unwrap();

    check_two_bone_fields(&setup, &[w0.clone(), w1.clone()]);
    // Diffused, not binary
    assert!(w0.data().iter().any(|&w| w > 0.0 && w < 1.0));
    assert!(w0[[0, 0, 0]] > w1[[0, 0, 0]]);
    assert!(w1[[19, 4, 4]] > w0[[19, 4, 4]]);
}

#[test]
fn test_capped_partition() {
    use domain::DomainPolicy;
    use skeleton::UNKNOWN;

    // One BFS round only reaches the voxels next to the bones
    let (labels, skel) = test_body();
    let opts = WeightOptions {
        max_partition_distance: Some(1),
        domain: DomainPolicy::Expansion { distance: 3 },
        ..test_options()
    };
    let setup = BodySetup::new(&labels, &skel, &opts);
    assert_eq!(setup.partition[[5, 0, 0]], UNKNOWN);
    assert_eq!(setup.partition[[15, 4, 4]], UNKNOWN);

    // Expansion claims them back
    let domain = compute_bone_domain(&setup.partition, &skel, 0, opts.domain).unwrap();
    assert!(domain[[5, 0, 0]]);
    assert!(!domain[[15, 4, 4]]);

    let w0 = compute_bone_weight(&setup, &skel, 0, &opts, &CancelToken::new()).unwrap();
    let w1 = compute_bone_weight(&setup, &skel, 1, &opts, &CancelToken::new()).unwrap();
    check_two_bone_fields(&setup, &[w0.clone(), w1.clone()]);
    assert!(w0[[5, 0, 0]] > w1[[5, 0, 0]]);
    assert!(w1[[15, 4, 4]] > w0[[15, 4, 4]]);
}
