// This file contains the code for the srnaclust distance subcommand.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;

use crate::distance_matrix::{pairwise_similarities, save_similarities, SimilarityMetric};
use crate::log::{section_header, explanation};
use crate::misc::{check_if_file_exists, quit_with_error};
use crate::profile::load_profiles;


pub fn distance(profiles_file: PathBuf, out_file: PathBuf, metric: SimilarityMetric,
                max_length: usize, seed: u64, threads: usize) {
    check_settings(&profiles_file, &out_file, max_length, threads);
    starting_message();
    print_settings(&profiles_file, &out_file, metric, max_length, seed, threads);
    let mut rng = StdRng::seed_from_u64(seed);
    let profiles = load_profiles(&profiles_file, max_length, None, &mut rng);
    if profiles.is_empty() {
        quit_with_error(&format!("no profiles found in {}", profiles_file.display()));
    }
    eprintln!("{} profiles loaded", profiles.len());
    eprintln!();
    let similarities = pairwise_similarities(&profiles, metric, threads);
    if let Err(e) = save_similarities(&similarities, &profiles, &out_file) {
        quit_with_error(&format!("failed to write {}\n{}", out_file.display(), e));
    }
    finished_message(similarities.len(), &out_file);
}


fn check_settings(profiles_file: &PathBuf, out_file: &PathBuf, max_length: usize,
                  threads: usize) {
    check_if_file_exists(profiles_file);
    if out_file.is_dir() {
        quit_with_error(&format!("{} is a directory", out_file.display()));
    }
    if max_length < 1 {
        quit_with_error("--max_length must be 1 or greater");
    }
    if threads < 1 {
        quit_with_error("--threads must be 1 or greater");
    }
}


fn starting_message() {
    section_header("Starting srnaclust distance");
    explanation("This command compares every pair of profiles and saves their similarities, so \
                 the same table can be reused by srnaclust annotate (via --distances).");
}


fn print_settings(profiles_file: &PathBuf, out_file: &PathBuf, metric: SimilarityMetric,
                  max_length: usize, seed: u64, threads: usize) {
    eprintln!("Settings:");
    eprintln!("  --profiles {}", profiles_file.display());
    eprintln!("  --out_file {}", out_file.display());
    eprintln!("  --metric {}", metric);
    eprintln!("  --max_length {}", max_length);
    eprintln!("  --seed {}", seed);
    eprintln!("  --threads {}", threads);
    eprintln!();
}


fn finished_message(pair_count: usize, out_file: &PathBuf) {
    section_header("Finished!");
    eprintln!("{} pairwise similarities saved to:", pair_count);
    eprintln!("  {}", out_file.display());
    eprintln!();
}
