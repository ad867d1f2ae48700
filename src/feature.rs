// This file contains the code for loading BED features and labelling profiles from the features
// they overlap.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashMap;
use std::path::Path;

use crate::misc::{load_file_lines, quit_with_error};
use crate::profile::{Category, Profile, Strand};


#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub strand: Option<Strand>,  // None for unstranded ('.') features
}

impl Feature {
    pub fn from_line(line: &str) -> Result<Feature, String> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 6 {
            return Err("expected 6 tab-delimited columns (BED6)".to_string());
        }
        let start = parts[1].trim().parse::<u64>()
            .map_err(|_| format!("bad start position: {}", parts[1]))?;
        let end = parts[2].trim().parse::<u64>()
            .map_err(|_| format!("bad end position: {}", parts[2]))?;
        if end < start {
            return Err(format!("end position {} before start position {}", end, start));
        }
        let strand = match parts[5].trim() {
            "." => None,
            s => Some(Strand::from_symbol(s).ok_or_else(|| format!("bad strand: {}", s))?),
        };
        Ok(Feature { chromosome: parts[0].to_string(), start, end, name: parts[3].to_string(),
                     strand })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    fn overlap(&self, profile: &Profile) -> u64 {
        // Shared bases, treating both intervals as closed.
        let low = self.start.max(profile.start);
        let high = self.end.min(profile.end);
        if low > high { 0 } else { high - low + 1 }
    }
}


pub fn load_features(filename: &Path) -> Vec<Feature> {
    let mut features = Vec::new();
    for (i, line) in load_file_lines(filename).iter().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with("track") ||
           line.starts_with("browser") {
            continue;
        }
        match Feature::from_line(line) {
            Ok(f) => features.push(f),
            Err(e) => quit_with_error(&format!("{} line {}: {}", filename.display(), i + 1, e)),
        }
    }
    features
}


pub fn label_from_features(profiles: &mut [Profile], features: &[Feature], ftop: f64,
                           ptof: f64) -> usize {
    // A feature labels a profile when they share a chromosome and strand, the shared bases cover
    // at least ftop of the feature and at least ptof of the profile. Of the accepted features the
    // one with the most shared bases wins (the first one on ties). Returns the number labelled.
    let mut by_chromosome: FxHashMap<&str, Vec<&Feature>> = FxHashMap::default();
    for f in features {
        by_chromosome.entry(f.chromosome.as_str()).or_default().push(f);
    }
    let mut labelled = 0;
    for profile in profiles.iter_mut() {
        let Some(candidates) = by_chromosome.get(profile.chromosome.as_str()) else { continue; };
        let profile_len = profile.len() as f64;
        let mut best: Option<(&Feature, u64)> = None;
        for &f in candidates {
            if f.strand.is_some_and(|s| s != profile.strand) { continue; }
            let overlap = f.overlap(profile);
            if overlap == 0 { continue; }
            if (overlap as f64) / (f.len() as f64) < ftop { continue; }
            if (overlap as f64) / profile_len < ptof { continue; }
            if best.map_or(true, |(_, o)| overlap > o) {
                best = Some((f, overlap));
            }
        }
        if let Some((f, overlap)) = best {
            profile.label = Some(f.name.clone());
            profile.score = overlap as f64;
            profile.category = Category::Known;
            labelled += 1;
        }
    }
    labelled
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::make_test_file;
    use maplit::hashmap;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn feature(chromosome: &str, start: u64, end: u64, name: &str, strand: &str) -> Feature {
        Feature::from_line(&format!("{}\t{}\t{}\t{}\t0\t{}", chromosome, start, end, name,
                                    strand)).unwrap()
    }

    fn profile(chromosome: &str, start: u64, end: u64, strand: Strand) -> Profile {
        let values = vec![1.0; (end - start + 1) as usize];
        Profile::new(chromosome.to_string(), start, end, strand, values)
    }

    #[test]
    fn test_from_line() {
        let f = feature("chr1", 100, 121, "mir-1", "+");
        assert_eq!(f.len(), 22);
        assert_eq!(f.strand, Some(Strand::Forward));
        assert_eq!(feature("chr1", 5, 6, "x", ".").strand, None);
        assert!(Feature::from_line("chr1\t100\t121\tmir-1").is_err());
        assert!(Feature::from_line("chr1\tabc\t121\tmir-1\t0\t+").is_err());
        assert!(Feature::from_line("chr1\t100\t121\tmir-1\t0\t*").is_err());
        assert!(Feature::from_line("chr1\t100\t90\tmir-1\t0\t+").is_err());
    }

    #[test]
    fn test_overlap() {
        let f = feature("chr1", 100, 121, "mir-1", "+");
        assert_eq!(f.overlap(&profile("chr1", 90, 130, Strand::Forward)), 22);
        assert_eq!(f.overlap(&profile("chr1", 110, 130, Strand::Forward)), 12);
        assert_eq!(f.overlap(&profile("chr1", 121, 130, Strand::Forward)), 1);
        assert_eq!(f.overlap(&profile("chr1", 122, 130, Strand::Forward)), 0);
    }

    #[test]
    fn test_label_from_features() {
        let features = vec![feature("chr1", 100, 121, "mir-1", "+"),
                            feature("chr1", 100, 121, "mir-1-rev", "-"),
                            feature("chr1", 95, 125, "mir-1-long", "+"),
                            feature("chr2", 10, 30, "snoRNA", "."),
                            feature("chr3", 1, 1000, "lncRNA", "+")];
        let mut profiles = vec![profile("chr1", 98, 123, Strand::Forward),
                                profile("chr1", 98, 123, Strand::Reverse),
                                profile("chr1", 115, 140, Strand::Forward),
                                profile("chr2", 10, 30, Strand::Reverse),
                                profile("chr3", 1, 30, Strand::Forward),
                                profile("chr4", 1, 30, Strand::Forward)];
        let labelled = label_from_features(&mut profiles, &features, 0.9, 0.5);
        assert_eq!(labelled, 3);

        // mir-1-long covers only 26 of its 31 bases, so the exact match wins.
        assert_eq!(profiles[0].label.as_deref(), Some("mir-1"));
        assert_eq!(profiles[0].score, 22.0);
        assert_eq!(profiles[0].category, Category::Known);
        assert_eq!(profiles[1].label.as_deref(), Some("mir-1-rev"));
        assert_eq!(profiles[2].label, None);
        assert_eq!(profiles[2].category, Category::Novel);
        assert_eq!(profiles[3].label.as_deref(), Some("snoRNA"));
        // The lncRNA is far longer than the profile.
        assert_eq!(profiles[4].label, None);
        assert_eq!(profiles[5].label, None);

        let labels: HashMap<usize, &str> = profiles.iter().enumerate()
            .filter_map(|(i, p)| p.label.as_deref().map(|l| (i, l))).collect();
        assert_eq!(labels, hashmap!{0 => "mir-1", 1 => "mir-1-rev", 3 => "snoRNA"});
    }

    #[test]
    fn test_largest_overlap_wins() {
        let features = vec![feature("chr1", 10, 19, "short", "+"),
                            feature("chr1", 10, 29, "long", "+"),
                            feature("chr1", 10, 29, "long-duplicate", "+")];
        let mut profiles = vec![profile("chr1", 10, 29, Strand::Forward)];
        label_from_features(&mut profiles, &features, 0.9, 0.5);
        assert_eq!(profiles[0].label.as_deref(), Some("long"));
        assert_eq!(profiles[0].score, 20.0);
    }

    #[test]
    fn test_load_features() {
        let dir = tempdir().unwrap();
        let bed = dir.path().join("features.bed");
        make_test_file(&bed, "track name=test\n# comment\nchr1\t1\t10\ta\t0\t+\n\nchr2\t5\t9\tb\t0\t-\n");
        let features = load_features(&bed);
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].name, "b");

        let bad = dir.path().join("bad.bed");
        make_test_file(&bad, "chr1\t1\t10\ta\n");
        assert!(std::panic::catch_unwind(|| { load_features(&bad); }).is_err());
    }
}
