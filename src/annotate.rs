// This file contains the code for the srnaclust annotate subcommand: the whole pipeline from
// profiles to clusters to propagated labels.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use rand::{rngs::StdRng, SeedableRng};
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::annotation::{annotate_cross_species, annotate_partition, annotate_tree,
                        fill_placeholders, Scheme};
use crate::density_peak::{dcoptimize, density_peak_cluster, greedy_density_peak_cluster,
                          CenterSelection, Kernel};
use crate::distance_matrix::{cross_distances, load_similarities, pairwise_similarities,
                             save_similarities, DistanceMatrix, SimilarityMetric};
use crate::feature::{label_from_features, load_features};
use crate::hierarchical::{choose_cutoff, hierarchical_cluster, save_newick, Hierarchy, Linkage};
use crate::log::{section_header, explanation};
use crate::metrics::ClusteringMetrics;
use crate::misc::{check_if_dir_is_not_dir, check_if_file_exists, create_dir, format_float,
                  quit_with_error};
use crate::profile::{load_profiles, Profile};


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    DensityPeak,        // Rodriguez and Laio density peaks
    DensityPeakGreedy,  // repeated extraction around the densest profile
    Hierarchical,       // agglomerative tree cut at the cutoff
}


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CenterMode {
    Quartiles,
    ScoreBreak,
}


pub struct AnnotateSettings {
    pub profiles: PathBuf,
    pub out_dir: PathBuf,
    pub annotations: Vec<PathBuf>,
    pub additional_profiles: Option<PathBuf>,
    pub species: String,
    pub distances: Option<PathBuf>,
    pub metric: SimilarityMetric,
    pub algorithm: Algorithm,
    pub kernel: Kernel,
    pub cutoff: String,
    pub k: String,
    pub centers: CenterMode,
    pub dc_ceiling: f64,
    pub linkage: Linkage,
    pub scheme: Scheme,
    pub overlap_ftop: f64,
    pub overlap_ptof: f64,
    pub cross_cutoff: f64,
    pub keep_unknown: bool,
    pub max_length: usize,
    pub seed: u64,
    pub threads: usize,
}


enum Clustering {
    Flat,
    Tree(Hierarchy, Vec<usize>),
}


pub fn annotate(settings: AnnotateSettings) {
    let crosscor = settings.out_dir.join("crosscor.dat");
    let newick = settings.out_dir.join("clusters.newick");
    let annotation_bed = settings.out_dir.join("annotation.bed");
    let clustering_yaml = settings.out_dir.join("clustering.yaml");
    let (cutoff, k) = check_settings(&settings);
    starting_message();
    print_settings(&settings, cutoff, k);
    create_dir(&settings.out_dir);

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut profiles = load_main_profiles(&settings, &mut rng);
    let mut foreign = load_additional_profiles(&settings, &mut rng);
    label_known_profiles(&settings, &mut profiles, &mut foreign);

    let similarities = get_similarities(&settings, &profiles);
    let matrix = DistanceMatrix::from_similarities(profiles.len(), &similarities);

    let (clustering, used_cutoff) = match settings.algorithm {
        Algorithm::DensityPeak => run_density_peak(&settings, &mut profiles, &matrix, cutoff, k),
        Algorithm::DensityPeakGreedy => run_greedy(&settings, &mut profiles, &matrix, cutoff),
        Algorithm::Hierarchical => run_hierarchical(&settings, &mut profiles, &matrix, cutoff),
    };
    let (propagated, placeholders) = propagate_labels(&settings, &mut profiles, &foreign,
                                                      &matrix, &clustering);
    let metrics = ClusteringMetrics::from_profiles(&profiles, used_cutoff, propagated,
                                                   placeholders);

    // Everything has been computed, so it's now safe to write output files.
    save_outputs(&profiles, &similarities, &clustering, &crosscor, &newick, &annotation_bed);
    metrics.save_to_yaml(&clustering_yaml);
    let newick = if matches!(clustering, Clustering::Tree(..)) { Some(newick) } else { None };
    finished_message(&metrics, &crosscor, newick.as_deref(), &annotation_bed, &clustering_yaml);
}


fn check_settings(settings: &AnnotateSettings) -> (Option<f64>, Option<usize>) {
    // Returns the parsed cutoff and cluster count (None for automatic).
    check_if_file_exists(&settings.profiles);
    for a in &settings.annotations {
        check_if_file_exists(a);
    }
    if let Some(a) = &settings.additional_profiles { check_if_file_exists(a); }
    if let Some(x) = &settings.distances { check_if_file_exists(x); }
    check_if_dir_is_not_dir(&settings.out_dir);
    if settings.scheme == Scheme::Weighted && settings.algorithm != Algorithm::Hierarchical {
        quit_with_error("--scheme weighted can only be used with --algorithm hierarchical");
    }
    for (name, value) in [("--overlap_ftop", settings.overlap_ftop),
                          ("--overlap_ptof", settings.overlap_ptof)] {
        if !(0.0..=1.0).contains(&value) {
            quit_with_error(&format!("{} must be between 0 and 1 (inclusive)", name));
        }
    }
    if settings.cross_cutoff < 0.0 {
        quit_with_error("--cross_cutoff must be 0 or greater");
    }
    if settings.dc_ceiling <= 0.0 {
        quit_with_error("--dc_ceiling must be greater than 0");
    }
    if settings.max_length < 1 {
        quit_with_error("--max_length must be 1 or greater");
    }
    if settings.threads < 1 {
        quit_with_error("--threads must be 1 or greater");
    }
    let cutoff = parse_auto_float(&settings.cutoff, "--cutoff");
    if cutoff.is_some_and(|c| c <= 0.0) {
        quit_with_error("--cutoff must be greater than 0");
    }
    if settings.algorithm == Algorithm::DensityPeakGreedy
            && cutoff.is_some_and(|c| c > settings.dc_ceiling) {
        quit_with_error("--cutoff can't be greater than --dc_ceiling for greedy density-peak \
                         clustering");
    }
    let k = parse_auto_usize(&settings.k, "--k");
    if k == Some(0) {
        quit_with_error("--k must be 1 or greater");
    }
    (cutoff, k)
}


fn parse_auto_float(text: &str, name: &str) -> Option<f64> {
    if text.eq_ignore_ascii_case("auto") { return None; }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => quit_with_error(&format!("{} must be a number or auto", name)),
    }
}


fn parse_auto_usize(text: &str, name: &str) -> Option<usize> {
    if text.eq_ignore_ascii_case("auto") { return None; }
    match text.parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => quit_with_error(&format!("{} must be an integer or auto", name)),
    }
}


fn starting_message() {
    section_header("Starting srnaclust annotate");
    explanation("This command clusters sRNA profiles by the similarity of their read-depth \
                 shapes and then uses profiles labelled from known features to annotate the \
                 rest of their cluster.");
}


fn print_settings(settings: &AnnotateSettings, cutoff: Option<f64>, k: Option<usize>) {
    eprintln!("Settings:");
    eprintln!("  --profiles {}", settings.profiles.display());
    eprintln!("  --out_dir {}", settings.out_dir.display());
    if !settings.annotations.is_empty() {
        eprintln!("  --annotation {}", settings.annotations.iter()
            .map(|a| a.display().to_string()).collect::<Vec<String>>().join(" "));
    }
    if let Some(a) = &settings.additional_profiles {
        eprintln!("  --additional_profiles {}", a.display());
        eprintln!("  --species {}", settings.species);
    }
    if let Some(x) = &settings.distances {
        eprintln!("  --distances {}", x.display());
    }
    if settings.distances.is_none() || settings.additional_profiles.is_some() {
        eprintln!("  --metric {}", settings.metric);
    }
    eprintln!("  --algorithm {}", value_name(settings.algorithm));
    match cutoff {
        Some(c) => eprintln!("  --cutoff {}", format_float(c)),
        None => eprintln!("  --cutoff auto"),
    }
    match settings.algorithm {
        Algorithm::DensityPeak => {
            eprintln!("  --kernel {}", value_name(settings.kernel));
            match k {
                Some(k) => eprintln!("  --k {}", k),
                None => eprintln!("  --centers {}", value_name(settings.centers)),
            }
        }
        Algorithm::DensityPeakGreedy => {
            eprintln!("  --kernel {}", value_name(settings.kernel));
            eprintln!("  --dc_ceiling {}", format_float(settings.dc_ceiling));
        }
        Algorithm::Hierarchical => {
            eprintln!("  --linkage {}", value_name(settings.linkage));
        }
    }
    eprintln!("  --scheme {}", value_name(settings.scheme));
    eprintln!("  --overlap_ftop {}", format_float(settings.overlap_ftop));
    eprintln!("  --overlap_ptof {}", format_float(settings.overlap_ptof));
    if settings.additional_profiles.is_some() {
        eprintln!("  --cross_cutoff {}", format_float(settings.cross_cutoff));
    }
    if settings.keep_unknown {
        eprintln!("  --keep_unknown");
    }
    eprintln!("  --max_length {}", settings.max_length);
    eprintln!("  --seed {}", settings.seed);
    eprintln!("  --threads {}", settings.threads);
    eprintln!();
}


fn value_name<T: ValueEnum>(value: T) -> String {
    value.to_possible_value().map(|v| v.get_name().to_string()).unwrap_or_default()
}


fn finished_message(metrics: &ClusteringMetrics, crosscor: &Path, newick: Option<&Path>,
                    annotation_bed: &Path, clustering_yaml: &Path) {
    section_header("Finished!");
    eprintln!("{} profiles in {} clusters ({} singletons)", metrics.profile_count,
              metrics.cluster_count, metrics.singleton_cluster_count);
    eprintln!("V-measure of known labels: {}", format_float(metrics.v_measure));
    eprintln!();
    eprintln!("Pairwise similarities: {}", crosscor.display());
    if let Some(newick) = newick {
        eprintln!("Clustering tree:       {}", newick.display());
    }
    eprintln!("Annotated profiles:    {}", annotation_bed.display());
    eprintln!("Clustering metrics:    {}", clustering_yaml.display());
    eprintln!();
}


fn load_main_profiles(settings: &AnnotateSettings, rng: &mut StdRng) -> Vec<Profile> {
    section_header("Loading profiles");
    explanation("Read-depth profiles are loaded and each gets a pool of noise values (drawn from \
                 its own depth distribution) to pad it when compared to longer profiles.");
    let profiles = load_profiles(&settings.profiles, settings.max_length, None, rng);
    if profiles.is_empty() {
        quit_with_error(&format!("no profiles found in {}", settings.profiles.display()));
    }
    eprintln!("{} profiles loaded from {}", profiles.len(), settings.profiles.display());
    eprintln!();
    profiles
}


fn load_additional_profiles(settings: &AnnotateSettings, rng: &mut StdRng) -> Vec<Profile> {
    let Some(filename) = &settings.additional_profiles else { return Vec::new(); };
    let profiles = load_profiles(filename, settings.max_length, Some(settings.species.as_str()),
                                 rng);
    eprintln!("{} {} profiles loaded from {}", profiles.len(), settings.species,
              filename.display());
    eprintln!();
    profiles
}


fn label_known_profiles(settings: &AnnotateSettings, profiles: &mut [Profile],
                        foreign: &mut [Profile]) {
    if settings.annotations.is_empty() { return; }
    section_header("Labelling from features");
    explanation("Profiles which overlap a known feature on the same strand (enough of the feature \
                 and enough of the profile) take that feature's name as their label.");
    let features: Vec<_> = settings.annotations.iter().flat_map(|a| load_features(a)).collect();
    eprintln!("{} features loaded", features.len());
    let labelled = label_from_features(profiles, &features, settings.overlap_ftop,
                                       settings.overlap_ptof);
    eprintln!("{} of {} profiles labelled", labelled, profiles.len());
    if !foreign.is_empty() {
        let foreign_labelled = label_from_features(foreign, &features, settings.overlap_ftop,
                                                   settings.overlap_ptof);
        eprintln!("{} of {} {} profiles labelled", foreign_labelled, foreign.len(),
                  settings.species);
    }
    eprintln!();
}


fn get_similarities(settings: &AnnotateSettings, profiles: &[Profile]) -> Vec<(usize, usize, f64)> {
    section_header("Pairwise similarities");
    let similarities = match &settings.distances {
        Some(filename) => {
            explanation("Pairwise similarities are loaded from the precomputed file.");
            load_similarities(filename, profiles)
        }
        None => {
            explanation("Every pair of profiles is compared. Each similarity is converted to a \
                         distance of 1 - max(0, similarity).");
            pairwise_similarities(profiles, settings.metric, settings.threads)
        }
    };
    eprintln!("{} pairwise similarities", similarities.len());
    eprintln!();
    similarities
}


fn run_density_peak(settings: &AnnotateSettings, profiles: &mut [Profile],
                    matrix: &DistanceMatrix, cutoff: Option<f64>,
                    k: Option<usize>) -> (Clustering, f64) {
    section_header("Density-peak clustering");
    explanation("Each profile gets a local density (rho) and a distance to the nearest denser \
                 profile (delta). Profiles high in both are cluster centers and the rest join \
                 the cluster of their nearest denser neighbour.");
    let selection = match (k, settings.centers) {
        (Some(k), _) => CenterSelection::TopK(k),
        (None, CenterMode::Quartiles) => CenterSelection::Quartiles,
        (None, CenterMode::ScoreBreak) => CenterSelection::ScoreBreak,
    };
    let model = density_peak_cluster(profiles, matrix, cutoff, settings.kernel, selection);
    if cutoff.is_none() {
        eprintln!("Cutoff (entropy-optimised): {}", format_float(model.dc));
    }
    eprintln!("rho first quartile:   {}", format_float(model.rho_q1));
    eprintln!("delta third quartile: {}", format_float(model.delta_q3));
    eprintln!("{} selected centers, {} clusters", model.centers.len(), model.cluster_count);
    eprintln!();
    (Clustering::Flat, model.dc)
}


fn run_greedy(settings: &AnnotateSettings, profiles: &mut [Profile], matrix: &DistanceMatrix,
              cutoff: Option<f64>) -> (Clustering, f64) {
    section_header("Greedy density-peak clustering");
    explanation("The densest remaining profile and its neighbours within the cutoff are \
                 repeatedly taken out as a cluster, until the cutoff grows past the ceiling.");
    let (cluster_count, last_dc) = greedy_density_peak_cluster(profiles, matrix, cutoff,
                                                               settings.dc_ceiling,
                                                               settings.kernel);
    eprintln!("Last cutoff: {}", format_float(last_dc));
    eprintln!("{} clusters", cluster_count);
    eprintln!();
    (Clustering::Flat, last_dc)
}


fn run_hierarchical(settings: &AnnotateSettings, profiles: &mut [Profile],
                    matrix: &DistanceMatrix, cutoff: Option<f64>) -> (Clustering, f64) {
    section_header("Hierarchical clustering");
    explanation("Profiles are joined into a tree by agglomerative clustering. The tree is then \
                 cut into branches at the cutoff distance.");
    let tree = hierarchical_cluster(matrix, settings.linkage);
    let cutoff = match cutoff {
        Some(c) => c,
        None => match choose_cutoff(&tree, profiles) {
            Some(c) => {
                eprintln!("Cutoff (best V-measure of known labels): {}", format_float(c));
                c
            }
            None => {
                let c = dcoptimize(matrix);
                eprintln!("Cutoff (entropy-optimised, no known labels): {}", format_float(c));
                c
            }
        },
    };
    let (clusters, branch_tops) = tree.branch(cutoff);
    for (p, &c) in profiles.iter_mut().zip(&clusters) {
        p.cluster = c;
    }
    eprintln!("{} merge nodes, {} branches, {} clusters", tree.nodes.len(), branch_tops.len(),
              clusters.iter().cloned().max().unwrap_or(0));
    eprintln!();
    (Clustering::Tree(tree, branch_tops), cutoff)
}


fn propagate_labels(settings: &AnnotateSettings, profiles: &mut [Profile], foreign: &[Profile],
                    matrix: &DistanceMatrix, clustering: &Clustering) -> (usize, usize) {
    // Returns the number of propagated labels and the number of placeholder labels.
    section_header("Annotating clusters");
    explanation("Labels are copied from labelled profiles to unlabelled ones, using only labels \
                 which were present before this step.");
    let mut propagated = match clustering {
        Clustering::Flat => annotate_partition(profiles, matrix, settings.scheme),
        Clustering::Tree(tree, tops) => annotate_tree(profiles, tree, tops, matrix,
                                                      settings.scheme),
    };
    eprintln!("{} labels propagated within clusters", propagated);
    if !foreign.is_empty() {
        eprintln!("Comparing to {} profiles with --metric {}", settings.species, settings.metric);
        if settings.distances.is_some() {
            eprintln!("  (--distances only covers this set, so check that it used the same metric)");
        }
        let cross = cross_distances(profiles, foreign, settings.metric, settings.threads);
        let cross_labelled = annotate_cross_species(profiles, foreign, &cross,
                                                    settings.cross_cutoff);
        eprintln!("{} labels transferred from {} profiles", cross_labelled, settings.species);
        propagated += cross_labelled;
    }
    let placeholders = if settings.keep_unknown { 0 } else { fill_placeholders(profiles) };
    if placeholders > 0 {
        eprintln!("{} profiles named after their cluster", placeholders);
    }
    eprintln!();
    (propagated, placeholders)
}


fn save_outputs(profiles: &[Profile], similarities: &[(usize, usize, f64)],
                clustering: &Clustering, crosscor: &Path, newick: &Path, annotation_bed: &Path) {
    if let Err(e) = save_similarities(similarities, profiles, crosscor) {
        quit_with_error(&format!("failed to write {}\n{}", crosscor.display(), e));
    }
    if let Clustering::Tree(tree, _) = clustering {
        if let Err(e) = save_newick(tree, profiles, newick) {
            quit_with_error(&format!("failed to write {}\n{}", newick.display(), e));
        }
    }
    if let Err(e) = save_annotation(profiles, annotation_bed) {
        quit_with_error(&format!("failed to write {}\n{}", annotation_bed.display(), e));
    }
}


pub fn save_annotation(profiles: &[Profile], filename: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);
    for p in profiles {
        writeln!(writer, "{}", p.bed_line())?;
    }
    writer.flush()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auto() {
        assert_eq!(parse_auto_float("auto", "--cutoff"), None);
        assert_eq!(parse_auto_float("AUTO", "--cutoff"), None);
        assert_eq!(parse_auto_float("0.25", "--cutoff"), Some(0.25));
        assert!(std::panic::catch_unwind(|| { parse_auto_float("abc", "--cutoff"); }).is_err());
        assert!(std::panic::catch_unwind(|| { parse_auto_float("inf", "--cutoff"); }).is_err());

        assert_eq!(parse_auto_usize("auto", "--k"), None);
        assert_eq!(parse_auto_usize("3", "--k"), Some(3));
        assert!(std::panic::catch_unwind(|| { parse_auto_usize("2.5", "--k"); }).is_err());
    }

    #[test]
    fn test_value_name() {
        assert_eq!(value_name(Algorithm::DensityPeakGreedy), "density-peak-greedy");
        assert_eq!(value_name(CenterMode::ScoreBreak), "score-break");
        assert_eq!(value_name(Scheme::Knn3), "knn3");
        assert_eq!(value_name(Linkage::Complete), "complete");
    }
}
