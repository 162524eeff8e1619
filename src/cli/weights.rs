use super::WeightsArgs;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;
use voxskin::errors::Result;
use voxskin::grid::Grid;
use voxskin::io::{read_mha, write_mha_to, write_weight_field};
use voxskin::pipeline::{BodySetup, compute_weights};
use voxskin::scheduler::CancelToken;
use voxskin::skeleton::{Label, read_armature};
use voxskin::util::OutDir;

pub fn run(args: &WeightsArgs) -> Result<()> {
    let labels: Grid<Label> = read_mha(&args.labels)?;
    let armature = read_armature(&args.armature)?;
    let skel = Arc::new(armature.skeleton);
    info!("{} bones, volume {:?}", skel.len(), labels.region().size);

    let start = Instant::now();
    let setup = Arc::new(BodySetup::new(&labels, &skel, &args.opts));

    let mut out = OutDir::new(args.output.clone())?;
    if args.debug_partition {
        write_label_volume(&mut out, "partition.mha", &setup.partition)?;
        write_label_volume(&mut out, "sources.mha", &setup.sources)?;
    }

    let mut num_written = 0;
    compute_weights(setup, skel.clone(), &args.opts, &CancelToken::new(), |bone, field| {
        write_weight_field(&mut out, bone, &field)?;
        num_written += 1;
        Ok(())
    })?;

    let secs = start.elapsed().as_secs_f64();
    info!("wrote {} weight volumes to {} ({:.1}s)", num_written, out.path().display(), secs);
    Ok(())
}

fn write_label_volume(out: &mut OutDir, name: &str, grid: &Grid<Label>) -> Result<()> {
    let mut w = BufWriter::new(out.create_file(name)?);
    write_mha_to(&mut w, grid)?;
    w.flush()?;
    info!("wrote {}", name);
    Ok(())
}
