extern crate atty;
extern crate clap;
#[macro_use]
extern crate log;
extern crate termcolor;
extern crate voxskin;

mod cli;
mod logger;
mod version;

use std::process::exit;
use voxskin::VERSION;

fn main() {
    let args = cli::parse_cli_args();

    let res = match args.command {
        cli::Command::Weights(ref a) => cli::weights::run(a),
        cli::Command::Pose(ref a) => cli::pose::run(a),
    };

    if let Err(e) = res {
        error!("{}", e);
        for cause in e.iter().skip(1) {
            error!("caused by: {}", cause);
        }
        exit(1);
    }
}
