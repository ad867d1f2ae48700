// This file contains the code for writing srnaclust's YAML file of clustering metrics.

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
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::evaluate::profile_v_measure;
use crate::misc::quit_with_error;
use crate::profile::{Category, Profile};


#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ClusteringMetrics {
    pub profile_count: usize,
    pub cluster_count: usize,
    pub singleton_cluster_count: usize,
    pub center_count: usize,
    pub halo_count: usize,
    pub cutoff: f64,
    pub known_label_count: usize,
    pub propagated_label_count: usize,
    pub placeholder_label_count: usize,
    pub homogeneity: f64,
    pub completeness: f64,
    pub v_measure: f64,
}

impl ClusteringMetrics {
    pub fn from_profiles(profiles: &[Profile], cutoff: f64, propagated: usize,
                         placeholders: usize) -> Self {
        let mut cluster_sizes: FxHashMap<usize, usize> = FxHashMap::default();
        for p in profiles {
            *cluster_sizes.entry(p.cluster).or_insert(0) += 1;
        }
        let score = profile_v_measure(profiles);
        ClusteringMetrics {
            profile_count: profiles.len(),
            cluster_count: cluster_sizes.len(),
            singleton_cluster_count: cluster_sizes.values().filter(|&&s| s == 1).count(),
            center_count: profiles.iter().filter(|p| p.center).count(),
            halo_count: profiles.iter().filter(|p| p.halo).count(),
            cutoff,
            known_label_count: profiles.iter().filter(|p| p.category == Category::Known).count(),
            propagated_label_count: propagated,
            placeholder_label_count: placeholders,
            homogeneity: score.homogeneity,
            completeness: score.completeness,
            v_measure: score.v_measure,
        }
    }

    pub fn save_to_yaml(&self, filename: &Path) {
        if let Err(e) = save_yaml(filename, self) {
            quit_with_error(&format!("failed to write {}\n{}", filename.display(), e));
        }
    }
}


pub fn save_yaml<T: Serialize>(yaml_filename: &Path, data: T) -> io::Result<()> {
    let yaml_string = serde_yaml::to_string(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut file = File::create(yaml_filename)?;
    file.write_all(yaml_string.as_bytes())?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Strand;
    use crate::tests::assert_almost_eq;
    use std::fs::read_to_string;
    use tempfile::tempdir;

    fn profile(cluster: usize, label: Option<&str>, known: bool) -> Profile {
        let mut p = Profile::new("chr1".to_string(), 1, 2, Strand::Forward, vec![1.0, 2.0]);
        p.cluster = cluster;
        p.label = label.map(|l| l.to_string());
        if known { p.category = Category::Known; }
        p
    }

    #[test]
    fn test_from_profiles() {
        let mut profiles = vec![profile(1, Some("a"), true), profile(1, Some("a"), false),
                                profile(2, Some("b"), true), profile(3, Some("cluster_3"), false)];
        profiles[0].center = true;
        profiles[2].center = true;
        profiles[1].halo = true;
        let metrics = ClusteringMetrics::from_profiles(&profiles, 0.25, 1, 1);
        assert_eq!(metrics.profile_count, 4);
        assert_eq!(metrics.cluster_count, 3);
        assert_eq!(metrics.singleton_cluster_count, 2);
        assert_eq!(metrics.center_count, 2);
        assert_eq!(metrics.halo_count, 1);
        assert_eq!(metrics.known_label_count, 2);
        assert_eq!(metrics.propagated_label_count, 1);
        assert_eq!(metrics.placeholder_label_count, 1);
        assert_almost_eq(metrics.cutoff, 0.25, 1e-12);
        assert_almost_eq(metrics.v_measure, 1.0, 1e-12);
    }

    #[test]
    fn test_save_to_yaml() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("clustering.yaml");
        let mut metrics = ClusteringMetrics::default();
        metrics.profile_count = 12;
        metrics.cluster_count = 3;
        metrics.save_to_yaml(&yaml);
        let text = read_to_string(&yaml).unwrap();
        assert!(text.contains("profile_count: 12\n"));
        assert!(text.contains("cluster_count: 3\n"));
        let loaded: ClusteringMetrics = serde_yaml::from_str(&text).unwrap();
        assert_eq!(loaded, metrics);
    }
}
