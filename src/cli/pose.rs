use super::PoseArgs;
use voxskin::errors::Result;
use voxskin::grid::{Grid, Scalar, Voxel};
use voxskin::io::{list_weight_files, read_mha, read_weight_map, write_mha};
use voxskin::pose::{Poser, pose_label_volume, posed_region};
use voxskin::skeleton::{Label, read_armature};

pub fn run(args: &PoseArgs) -> Result<()> {
    let labels: Grid<Label> = read_mha(&args.labels)?;
    let armature = read_armature(&args.armature)?;
    let skel = &armature.skeleton;

    let files = list_weight_files(&args.weights_dir)?;
    if files.len() != skel.len() {
        warn!("{} weight volumes for {} bones", files.len(), skel.len());
    }
    let body: Vec<Voxel> = labels.voxels()
        .filter(|&v| !labels[v].is_background())
        .collect();
    let mut map = read_weight_map(&files, &body, labels.region(), args.min_weight)?;

    map.set_mask_image(&labels, args.opts.mask_min_label as f64);
    if let Some(degree) = args.opts.max_filiation_degree {
        map.set_weights_filiation(skel.len(), &skel.ancestry_pairs(), degree);
    }

    let poses = armature.pose_transforms();
    let poser = Poser::new(&map, *labels.geometry(), &poses, args.opts.blend);
    let region = posed_region(labels.geometry(), skel, &poses);
    debug!("posed volume: {:?} of the input lattice", region);
    let (posed, stats) = pose_label_volume(&labels, &poser, region, args.opts.max_splat_radius);
    if stats.posed == 0 {
        return Err("no voxel could be posed".into());
    }

    write_mha(&args.output, &posed)?;
    info!("wrote {}", args.output.display());
    Ok(())
}
