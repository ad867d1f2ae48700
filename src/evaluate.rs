// This file contains the code for scoring a clustering against known labels (V-measure) and the
// srnaclust evaluate subcommand.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::log::{section_header, explanation};
use crate::misc::{check_if_file_exists, format_float, load_file_lines, quit_with_error};
use crate::profile::{Category, Profile};


#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct VMeasure {
    pub homogeneity: f64,
    pub completeness: f64,
    pub v_measure: f64,
}


pub fn evaluate(annotation_bed: PathBuf) {
    check_settings(&annotation_bed);
    starting_message();
    print_settings(&annotation_bed);
    let pairs = load_known_clusters(&annotation_bed);
    eprintln!("{} profiles with known labels", pairs.len());
    eprintln!();
    let refs: Vec<(&str, usize)> = pairs.iter().map(|(l, c)| (l.as_str(), *c)).collect();
    let score = v_measure(&refs);
    match serde_yaml::to_string(&score) {
        Ok(yaml) => print!("{}", yaml),
        Err(e) => quit_with_error(&format!("failed to format scores\n{}", e)),
    }
    finished_message(&score);
}


fn check_settings(annotation_bed: &PathBuf) {
    check_if_file_exists(annotation_bed);
}


fn starting_message() {
    section_header("Starting srnaclust evaluate");
    explanation("This command scores the clusters of an annotation file against the labels of \
                 its known (feature-derived) profiles, using homogeneity, completeness and their \
                 harmonic mean, the V-measure.");
}


fn print_settings(annotation_bed: &PathBuf) {
    eprintln!("Settings:");
    eprintln!("  --in_bed {}", annotation_bed.display());
    eprintln!();
}


fn finished_message(score: &VMeasure) {
    section_header("Finished!");
    eprintln!("Homogeneity:  {}", format_float(score.homogeneity));
    eprintln!("Completeness: {}", format_float(score.completeness));
    eprintln!("V-measure:    {}", format_float(score.v_measure));
    eprintln!();
}


fn load_known_clusters(filename: &PathBuf) -> Vec<(String, usize)> {
    // Reads the label and cluster id of every KNOWN row of an annotation BED file.
    let mut pairs = Vec::new();
    for (i, line) in load_file_lines(filename).iter().enumerate() {
        if line.trim().is_empty() { continue; }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 8 {
            quit_with_error(&format!("{} line {}: expected 8 tab-delimited columns",
                                     filename.display(), i + 1));
        }
        if parts[6] != "KNOWN" { continue; }
        let cluster = parts[7].trim().parse::<usize>().unwrap_or_else(|_| {
            quit_with_error(&format!("{} line {}: bad cluster id: {}",
                                     filename.display(), i + 1, parts[7]));
        });
        pairs.push((parts[3].to_string(), cluster));
    }
    pairs
}


pub fn profile_v_measure(profiles: &[Profile]) -> VMeasure {
    // Scores the clusters of the profiles that were labelled from features.
    let pairs: Vec<(&str, usize)> = profiles.iter()
        .filter(|p| p.category == Category::Known)
        .filter_map(|p| p.label.as_deref().map(|l| (l, p.cluster)))
        .collect();
    v_measure(&pairs)
}


pub fn v_measure(pairs: &[(&str, usize)]) -> VMeasure {
    // Each pair is (class label, cluster id). An empty set scores 0 throughout.
    if pairs.is_empty() { return VMeasure::default(); }
    let mut label_ids: FxHashMap<&str, usize> = FxHashMap::default();
    let classes: Vec<usize> = pairs.iter().map(|(label, _)| {
        let next = label_ids.len();
        *label_ids.entry(*label).or_insert(next)
    }).collect();
    let clusters: Vec<usize> = pairs.iter().map(|(_, c)| *c).collect();

    let (h_c, h_c_given_k) = conditional_entropies(&classes, &clusters);
    let (h_k, h_k_given_c) = conditional_entropies(&clusters, &classes);
    let homogeneity = if h_c > 0.0 { 1.0 - h_c_given_k / h_c } else { 1.0 };
    let completeness = if h_k > 0.0 { 1.0 - h_k_given_c / h_k } else { 1.0 };
    let v_measure = if homogeneity + completeness > 0.0 {
        2.0 * homogeneity * completeness / (homogeneity + completeness)
    } else {
        0.0
    };
    VMeasure { homogeneity, completeness, v_measure }
}


fn conditional_entropies(a: &[usize], b: &[usize]) -> (f64, f64) {
    // Returns H(A) and H(A|B) in bits, with 0 * log(0) taken as 0.
    let n = a.len() as f64;
    let mut count_a: FxHashMap<usize, usize> = FxHashMap::default();
    let mut count_b: FxHashMap<usize, usize> = FxHashMap::default();
    let mut joint: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    for (&va, &vb) in a.iter().zip(b) {
        *count_a.entry(va).or_insert(0) += 1;
        *count_b.entry(vb).or_insert(0) += 1;
        *joint.entry((va, vb)).or_insert(0) += 1;
    }
    let h_a: f64 = count_a.values().map(|&c| {
        let p = c as f64 / n;
        -p * p.log2()
    }).sum();
    let h_a_given_b: f64 = joint.iter().map(|(&(_, vb), &n_ab)| {
        let p_ab = n_ab as f64 / n;
        let p_a_given_b = n_ab as f64 / count_b[&vb] as f64;
        -p_ab * p_a_given_b.log2()
    }).sum();
    (h_a, h_a_given_b.max(0.0))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{assert_almost_eq, make_test_file};
    use tempfile::tempdir;

    #[test]
    fn test_v_measure_perfect() {
        let score = v_measure(&[("a", 1), ("a", 1), ("b", 2), ("b", 2)]);
        assert_almost_eq(score.homogeneity, 1.0, 1e-12);
        assert_almost_eq(score.completeness, 1.0, 1e-12);
        assert_almost_eq(score.v_measure, 1.0, 1e-12);

        // Cluster ids are arbitrary.
        let score = v_measure(&[("a", 7), ("a", 7), ("b", 3), ("b", 3)]);
        assert_almost_eq(score.v_measure, 1.0, 1e-12);
    }

    #[test]
    fn test_v_measure_one_cluster() {
        let score = v_measure(&[("a", 1), ("a", 1), ("b", 1), ("b", 1)]);
        assert_almost_eq(score.homogeneity, 0.0, 1e-12);
        assert_almost_eq(score.completeness, 1.0, 1e-12);
        assert_almost_eq(score.v_measure, 0.0, 1e-12);
    }

    #[test]
    fn test_v_measure_all_singletons() {
        let score = v_measure(&[("a", 1), ("a", 2), ("b", 3), ("b", 4)]);
        assert_almost_eq(score.homogeneity, 1.0, 1e-12);
        assert_almost_eq(score.completeness, 0.5, 1e-12);
        assert_almost_eq(score.v_measure, 2.0 / 3.0, 1e-12);
    }

    #[test]
    fn test_v_measure_bounds() {
        let score = v_measure(&[("a", 1), ("b", 1), ("a", 2), ("c", 2), ("c", 3), ("b", 3)]);
        for value in [score.homogeneity, score.completeness, score.v_measure] {
            assert!(value >= 0.0 && value <= 1.0);
        }
        assert_eq!(v_measure(&[]), VMeasure::default());
        let single = v_measure(&[("a", 1)]);
        assert_almost_eq(single.v_measure, 1.0, 1e-12);
    }

    #[test]
    fn test_load_known_clusters() {
        let dir = tempdir().unwrap();
        let bed = dir.path().join("annotation.bed");
        make_test_file(&bed, "chr1\t1\t4\tmir-1\t4\t+\tKNOWN\t1\n\
                              chr1\t9\t12\tmir-1\t0.9\t+\tNOVEL\t1\n\
                              chr2\t1\t4\tmir-2\t4\t-\tKNOWN\t2\n");
        let pairs = load_known_clusters(&bed);
        assert_eq!(pairs, vec![("mir-1".to_string(), 1), ("mir-2".to_string(), 2)]);

        let bad = dir.path().join("bad.bed");
        make_test_file(&bad, "chr1\t1\t4\tmir-1\t4\t+\tKNOWN\tx\n");
        assert!(std::panic::catch_unwind(|| { load_known_clusters(&bad); }).is_err());
    }
}
