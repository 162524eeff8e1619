use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::Level;
use logger;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use version;
use voxskin::config::{PoseOptions, WeightOptions};
use voxskin::domain::DomainPolicy;
use voxskin::partition::HeatSources;
use voxskin::skinning::BlendMode;

pub mod pose;
pub mod weights;

pub struct Args {
    pub command: Command,
}

pub enum Command {
    Weights(WeightsArgs),
    Pose(PoseArgs),
}

pub struct WeightsArgs {
    pub labels: PathBuf,
    pub armature: PathBuf,
    pub output: PathBuf,
    pub debug_partition: bool,
    pub opts: WeightOptions,
}

pub struct PoseArgs {
    pub labels: PathBuf,
    pub armature: PathBuf,
    pub weights_dir: PathBuf,
    pub output: PathBuf,
    pub min_weight: f32,
    pub opts: PoseOptions,
}

fn app() -> App<'static, 'static> {
    App::new("voxskin")
        .about("Bone weights for label volumes by heat diffusion, and posing with them")
        .setting(AppSettings::DisableVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(Arg::with_name("version").short("V").long("version")
            .help("Print version info"))
        .arg(Arg::with_name("verbose").short("v").long("verbose").global(true)
            .help("Print debug messages"))
        .arg(Arg::with_name("quiet").short("q").long("quiet").global(true)
            .conflicts_with("verbose")
            .help("Only print warnings and errors"))
        .subcommand(SubCommand::with_name("weights")
            .about("Compute a weight volume for every bone")
            .arg(Arg::with_name("LABELS").required(true).help("Label volume (.mha)"))
            .arg(Arg::with_name("ARMATURE").required(true).help("Armature (.json)"))
            .arg(Arg::with_name("output").short("o").long("output").takes_value(true)
                .value_name("DIR").required(true)
                .help("Place weight_NNN.mha files here (will be created)"))
            .arg(Arg::with_name("envelope").long("envelope")
                .help("Use the bones' envelope capsules as domains"))
            .arg(Arg::with_name("expansion").long("expansion").takes_value(true)
                .value_name("N").conflicts_with("envelope")
                .help("Grow each bone's partition region by N voxels [default: 3]"))
            .arg(Arg::with_name("max-partition-distance").long("max-partition-distance")
                .takes_value(true).value_name("N")
                .help("Stop partitioning the body after N voxels from the skeleton"))
            .arg(Arg::with_name("sources").long("sources").takes_value(true)
                .possible_values(&["tissue", "skeleton"])
                .help("Heat sources: bone tissue labels or the rasterized skeleton [default: tissue]"))
            .arg(Arg::with_name("bone-label").long("bone-label").takes_value(true)
                .value_name("LABEL")
                .help("Labels at least LABEL are bone tissue [default: 209]"))
            .arg(Arg::with_name("smoothing").long("smoothing").takes_value(true)
                .value_name("N")
                .help("Relaxation sweeps over the whole body [default: 10]"))
            .arg(Arg::with_name("binary").long("binary")
                .help("Weight 1 on each bone's domain and 0 elsewhere, no diffusion"))
            .arg(Arg::with_name("threads").short("j").long("threads").takes_value(true)
                .value_name("N")
                .help("Solve at most N bones at once [default: number of CPUs]"))
            .arg(Arg::with_name("debug-partition").long("debug-partition")
                .help("Also write partition.mha and sources.mha")))
        .subcommand(SubCommand::with_name("pose")
            .about("Pose a label volume with precomputed weights")
            .arg(Arg::with_name("LABELS").required(true).help("Label volume (.mha)"))
            .arg(Arg::with_name("ARMATURE").required(true).help("Armature with poses (.json)"))
            .arg(Arg::with_name("WEIGHTS").required(true).help("Directory of weight volumes"))
            .arg(Arg::with_name("output").short("o").long("output").takes_value(true)
                .value_name("FILE").required(true)
                .help("Posed label volume (.mha)"))
            .arg(Arg::with_name("linear").long("linear")
                .help("Linear blend skinning instead of dual quaternions"))
            .arg(Arg::with_name("max-bones").long("max-bones").takes_value(true)
                .value_name("N").conflicts_with("linear")
                .help("Blend at most the N heaviest bones [default: 4]"))
            .arg(Arg::with_name("max-filiation").long("max-filiation").takes_value(true)
                .value_name("N")
                .help("Only interpolate between bones at most N parent links apart"))
            .arg(Arg::with_name("mask-label").long("mask-label").takes_value(true)
                .value_name("LABEL")
                .help("Only interpolate from voxels labeled at least LABEL [default: 1]"))
            .arg(Arg::with_name("max-radius").long("max-radius").takes_value(true)
                .value_name("R")
                .help("Largest sub-voxel neighbourhood splatted to fill holes, 0 to disable [default: 64]"))
            .arg(Arg::with_name("min-weight").long("min-weight").takes_value(true)
                .value_name("W")
                .help("Drop weights below W when reading [default: 0]")))
}

pub fn parse_cli_args() -> Args {
    let matches = app().get_matches();

    let level = if flag(&matches, "verbose") {
        Level::Debug
    } else if flag(&matches, "quiet") {
        Level::Warn
    } else {
        Level::Info
    };
    logger::init(level);

    if matches.is_present("version") {
        version::print_version_info();
        exit(0);
    }

    let command = match matches.subcommand() {
        ("weights", Some(m)) => Command::Weights(weights_args(m)),
        ("pose", Some(m)) => Command::Pose(pose_args(m)),
        _ => {
            let _ = app().print_help();
            println!();
            exit(0);
        }
    };
    Args { command }
}

fn weights_args(m: &ArgMatches) -> WeightsArgs {
    let mut opts = WeightOptions::default();
    if m.is_present("envelope") {
        opts.domain = DomainPolicy::Envelope;
    } else if let Some(distance) = value(m, "expansion") {
        opts.domain = DomainPolicy::Expansion { distance };
    }
    opts.max_partition_distance = value(m, "max-partition-distance");
    let min_label = value(m, "bone-label").unwrap_or(209);
    opts.sources = match m.value_of("sources") {
        Some("skeleton") => HeatSources::Skeleton,
        _ => HeatSources::BoneTissue { min_label },
    };
    if let Some(n) = value(m, "smoothing") {
        opts.smoothing_iterations = n;
    }
    opts.binary_weight = m.is_present("binary");
    if let Some(n) = value::<usize>(m, "threads") {
        opts.threads = n.max(1);
    }

    WeightsArgs {
        labels: path(m, "LABELS"),
        armature: path(m, "ARMATURE"),
        output: path(m, "output"),
        debug_partition: m.is_present("debug-partition"),
        opts,
    }
}

fn pose_args(m: &ArgMatches) -> PoseArgs {
    let mut opts = PoseOptions::default();
    if m.is_present("linear") {
        opts.blend = BlendMode::Linear;
    } else if let Some(max_bones) = value::<usize>(m, "max-bones") {
        opts.blend = BlendMode::DualQuaternion { max_bones: max_bones.max(1) };
    }
    opts.max_filiation_degree = value(m, "max-filiation");
    if let Some(label) = value(m, "mask-label") {
        opts.mask_min_label = label;
    }
    if let Some(radius) = value(m, "max-radius") {
        opts.max_splat_radius = radius;
    }

    PoseArgs {
        labels: path(m, "LABELS"),
        armature: path(m, "ARMATURE"),
        weights_dir: path(m, "WEIGHTS"),
        output: path(m, "output"),
        min_weight: value(m, "min-weight").unwrap_or(0.0),
        opts,
    }
}

/// Whether a global flag was given, before or after the subcommand.
fn flag(matches: &ArgMatches, name: &str) -> bool {
    if matches.is_present(name) {
        return true;
    }
    match matches.subcommand() {
        (_, Some(m)) => m.is_present(name),
        _ => false,
    }
}

fn path(m: &ArgMatches, name: &str) -> PathBuf {
    // clap has already rejected missing required args
    m.value_of_os(name).map(PathBuf::from).unwrap_or_default()
}

/// Parses the value of an option, exiting if it's malformed.
fn value<T: FromStr>(m: &ArgMatches, name: &str) -> Option<T> {
    let s = m.value_of(name)?;
    match s.parse() {
        Ok(x) => Some(x),
        Err(_) => {
            error!("don't understand --{} {}", name, s);
            info!("use `voxskin help` for help");
            exit(1);
        }
    }
}
