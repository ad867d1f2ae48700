// This is the main file of srnaclust and where execution starts. It mainly handles the CLI and
// then calls into other files to run whichever subcommand the user chose.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;
use clap::{Parser, Subcommand, crate_version};

mod annotate;
mod annotation;
mod density_peak;
mod distance;
mod distance_matrix;
mod dtw;
mod evaluate;
mod feature;
mod hierarchical;
mod log;
mod metrics;
mod misc;
mod profile;
mod xcorr;


use annotate::{AnnotateSettings, Algorithm, CenterMode};
use annotation::Scheme;
use density_peak::Kernel;
use distance_matrix::SimilarityMetric;
use hierarchical::Linkage;

#[derive(Parser)]
#[clap(name = "srnaclust",
       version = concat!("v", crate_version!()),
       about = "clustering and annotation of small RNA read-depth profiles",
       before_help = concat!(r#"                                  _           _   "#, "\n",
                             r#"  ___ _ __ _ __   __ _  ___| |_   _ ___| |_ "#, "\n",
                             r#" / __| '__| '_ \ / _` |/ __| | | | / __| __|"#, "\n",
                             r#" \__ \ |  | | | | (_| | (__| | |_| \__ \ |_ "#, "\n",
                             r#" |___/_|  |_| |_|\__,_|\___|_|\__,_|___/\__|"#))]
#[command(author, version, long_about = None, disable_help_subcommand = true,
          propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {

    /// cluster profiles and propagate labels from known features
    Annotate {
        /// Profiles file, one profile per line (required)
        #[clap(short = 'p', long = "profiles", required = true)]
        profiles: PathBuf,

        /// Output directory (required)
        #[clap(short = 'o', long = "out_dir", required = true)]
        out_dir: PathBuf,

        /// BED6 files of known features used to label profiles
        #[clap(short = 'a', long = "annotation", num_args = 1..)]
        annotation: Vec<PathBuf>,

        /// Profiles of another species to transfer labels from
        #[clap(long = "additional_profiles")]
        additional_profiles: Option<PathBuf>,

        /// Name of the species of the additional profiles
        #[clap(long = "species", default_value = "additional")]
        species: String,

        /// Precomputed pairwise similarities (skips the distance computation)
        #[clap(short = 'x', long = "distances")]
        distances: Option<PathBuf>,

        /// Similarity metric between profiles
        #[clap(long = "metric", value_enum, default_value = "xcorr")]
        metric: SimilarityMetric,

        /// Clustering algorithm
        #[clap(long = "algorithm", value_enum, default_value = "density-peak")]
        algorithm: Algorithm,

        /// Local density kernel for density-peak clustering
        #[clap(long = "kernel", value_enum, default_value = "hard")]
        kernel: Kernel,

        /// Distance cutoff, or auto to choose it from the data
        #[clap(long = "cutoff", default_value = "auto")]
        cutoff: String,

        /// Number of density-peak clusters, or auto to choose centers with --centers
        #[clap(long = "k", default_value = "auto")]
        k: String,

        /// Center selection for density-peak clustering when --k is auto
        #[clap(long = "centers", value_enum, default_value = "quartiles")]
        centers: CenterMode,

        /// Largest cutoff for greedy density-peak clustering
        #[clap(long = "dc_ceiling", default_value = "0.4")]
        dc_ceiling: f64,

        /// Linkage for hierarchical clustering
        #[clap(long = "linkage", value_enum, default_value = "average")]
        linkage: Linkage,

        /// Label propagation scheme (weighted needs --algorithm hierarchical)
        #[clap(long = "scheme", value_enum, default_value = "majority")]
        scheme: Scheme,

        /// Minimum fraction of a feature covered by a profile to label it
        #[clap(long = "overlap_ftop", default_value = "0.9")]
        overlap_ftop: f64,

        /// Minimum fraction of a profile covered by a feature to label it
        #[clap(long = "overlap_ptof", default_value = "0.5")]
        overlap_ptof: f64,

        /// Maximum distance for transferring labels from the additional profiles
        #[clap(long = "cross_cutoff", default_value = "0.01")]
        cross_cutoff: f64,

        /// Leave unresolved profiles unlabelled instead of naming them after their cluster
        #[clap(long = "keep_unknown")]
        keep_unknown: bool,

        /// Maximum profile length
        #[clap(long = "max_length", default_value = "500")]
        max_length: usize,

        /// Seed for random number generator
        #[clap(short = 's', long = "seed", default_value = "0")]
        seed: u64,

        /// Number of CPU threads
        #[clap(short = 't', long = "threads", default_value = "1")]
        threads: usize,
    },

    /// compute pairwise similarities between profiles
    Distance {
        /// Profiles file, one profile per line (required)
        #[clap(short = 'p', long = "profiles", required = true)]
        profiles: PathBuf,

        /// Output file of pairwise similarities (required)
        #[clap(short = 'o', long = "out_file", required = true)]
        out_file: PathBuf,

        /// Similarity metric between profiles
        #[clap(long = "metric", value_enum, default_value = "xcorr")]
        metric: SimilarityMetric,

        /// Maximum profile length
        #[clap(long = "max_length", default_value = "500")]
        max_length: usize,

        /// Seed for random number generator
        #[clap(short = 's', long = "seed", default_value = "0")]
        seed: u64,

        /// Number of CPU threads
        #[clap(short = 't', long = "threads", default_value = "1")]
        threads: usize,
    },

    /// score the clusters of an annotation file against its known labels
    Evaluate {
        /// Annotation BED file made by srnaclust annotate (required)
        #[clap(short = 'i', long = "in_bed", required = true)]
        in_bed: PathBuf,
    },
}


fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Annotate { profiles, out_dir, annotation, additional_profiles, species,
                                  distances, metric, algorithm, kernel, cutoff, k, centers,
                                  dc_ceiling, linkage, scheme, overlap_ftop, overlap_ptof,
                                  cross_cutoff, keep_unknown, max_length, seed, threads }) => {
            annotate::annotate(AnnotateSettings {
                profiles, out_dir, annotations: annotation, additional_profiles, species,
                distances, metric, algorithm, kernel, cutoff, k, centers, dc_ceiling, linkage,
                scheme, overlap_ftop, overlap_ptof, cross_cutoff, keep_unknown, max_length, seed,
                threads,
            });
        },
        Some(Commands::Distance { profiles, out_file, metric, max_length, seed, threads }) => {
            distance::distance(profiles, out_file, metric, max_length, seed, threads);
        },
        Some(Commands::Evaluate { in_bed }) => {
            evaluate::evaluate(in_bed);
        },
        None => {}
    }
}
