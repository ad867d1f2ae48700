// This file defines the Profile struct (a read-depth vector over a genomic interval) and the code
// for loading profiles from file.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use rand::{Rng, rngs::StdRng};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use crate::misc::{format_float, load_file_lines, mean, quit_with_error, variance};

const GAUSSIAN_TERMS: usize = 20;


fn header_regex() -> &'static Regex {
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    HEADER_RE.get_or_init(|| Regex::new(r"^(.+):(\d+)-(\d+):([+-])$").unwrap())
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_symbol(text: &str) -> Option<Strand> {
        match text {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Known,
    Novel,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Known => write!(f, "KNOWN"),
            Category::Novel => write!(f, "NOVEL"),
        }
    }
}


#[derive(Clone)]
pub struct Profile {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub values: Vec<f64>,
    pub max_height: f64,
    pub mean: f64,
    pub variance: f64,
    pub noise: Vec<f64>,
    pub label: Option<String>,
    pub score: f64,
    pub category: Category,
    pub cluster: usize,
    pub center: bool,
    pub halo: bool,
    pub species: Option<String>,
}

impl Profile {
    pub fn new(chromosome: String, start: u64, end: u64, strand: Strand,
               values: Vec<f64>) -> Profile {
        let max_height = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let max_height = if max_height.is_finite() { max_height } else { 0.0 };
        Profile {
            chromosome,
            start,
            end,
            strand,
            mean: mean(&values),
            variance: variance(&values),
            max_height,
            values,
            noise: vec![],
            label: None,
            score: 0.0,
            category: Category::Novel,
            cluster: 0,
            center: false,
            halo: false,
            species: None,
        }
    }

    pub fn from_line(line: &str) -> Result<Profile, String> {
        // Parses one profile line: a coordinate header followed by tab-separated read depths, one
        // per base of the interval.
        let mut parts = line.split('\t');
        let header = parts.next().unwrap_or("");
        let caps = header_regex().captures(header)
            .ok_or_else(|| format!("malformed profile header: {}", header))?;
        let chromosome = caps[1].to_string();
        let start: u64 = caps[2].parse().map_err(|_| format!("bad start position: {}", &caps[2]))?;
        let end: u64 = caps[3].parse().map_err(|_| format!("bad end position: {}", &caps[3]))?;
        let strand = Strand::from_symbol(&caps[4])
            .ok_or_else(|| format!("bad strand: {}", &caps[4]))?;
        if end < start {
            return Err(format!("end position before start position: {}", header));
        }
        let values = parts.map(|v| match v.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(x),
            _ => Err(format!("non-numeric value: {}", v)),
        }).collect::<Result<Vec<f64>, String>>()?;
        let expected = (end - start + 1) as usize;
        if values.len() != expected {
            return Err(format!("{} has {} values but its interval spans {} bases",
                               header, values.len(), expected));
        }
        Ok(Profile::new(chromosome, start, end, strand, values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn coordinate(&self) -> String {
        format!("{}:{}-{}:{}", self.chromosome, self.start, self.end, self.strand.as_char())
    }

    pub fn string_for_newick(&self) -> String {
        format!("{}_{}-{}_{}", self.chromosome, self.start, self.end, self.strand.as_char())
    }

    pub fn fill_noise(&mut self, pool_size: usize, rng: &mut StdRng) {
        // The noise pool holds negated Gaussian samples with this profile's mean and variance.
        // They stand in for this profile wherever an alignment needs a sample beyond its end.
        let sd = self.variance.sqrt();
        self.noise = (0..pool_size).map(|_| -(self.mean + sd * gaussian(rng))).collect();
    }

    pub fn is_labelled(&self) -> bool {
        self.label.is_some()
    }

    pub fn bed_line(&self) -> String {
        format!("{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}", self.chromosome, self.start, self.end,
                self.label.as_deref().unwrap_or("unknown"), format_float(self.score),
                self.strand.as_char(), self.category, self.cluster)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinate())
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Display::fmt(self, f) }
}


fn gaussian(rng: &mut StdRng) -> f64 {
    // Approximates a standard normal sample by summing uniforms (central limit theorem).
    let sum: f64 = (0..GAUSSIAN_TERMS).map(|_| rng.random::<f64>()).sum();
    let n = GAUSSIAN_TERMS as f64;
    (sum - n / 2.0) * (12.0 / n).sqrt()
}


pub fn load_profiles(filename: &Path, max_length: usize, species: Option<&str>,
                     rng: &mut StdRng) -> Vec<Profile> {
    let mut profiles = Vec::new();
    for (i, line) in load_file_lines(filename).iter().enumerate() {
        if line.trim().is_empty() { continue; }
        let mut profile = Profile::from_line(line).unwrap_or_else(|e| {
            quit_with_error(&format!("{} line {}: {}", filename.display(), i + 1, e));
        });
        if profile.len() > max_length {
            quit_with_error(&format!("{} line {}: profile {} is {} bases long (maximum is {})",
                                     filename.display(), i + 1, profile, profile.len(),
                                     max_length));
        }
        profile.fill_noise(max_length, rng);
        profile.species = species.map(|s| s.to_string());
        profiles.push(profile);
    }
    profiles
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{assert_almost_eq, make_test_file};
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_from_line() {
        let p = Profile::from_line("chr1:100-103:+\t1\t2\t3\t4").unwrap();
        assert_eq!(p.chromosome, "chr1");
        assert_eq!(p.start, 100);
        assert_eq!(p.end, 103);
        assert_eq!(p.strand, Strand::Forward);
        assert_eq!(p.len(), 4);
        assert_almost_eq(p.max_height, 4.0, 1e-12);
        assert_almost_eq(p.mean, 2.5, 1e-12);
        assert_almost_eq(p.variance, 1.6666666666666667, 1e-12);
        assert_eq!(p.label, None);
        assert_eq!(p.category, Category::Novel);
        assert_eq!(p.cluster, 0);
        assert_eq!(p.coordinate(), "chr1:100-103:+");
        assert_eq!(p.string_for_newick(), "chr1_100-103_+");
        assert_eq!(format!("{}", p), "chr1:100-103:+");
    }

    #[test]
    fn test_from_line_chromosome_with_colon() {
        let p = Profile::from_line("scaffold:7:5-5:-\t3").unwrap();
        assert_eq!(p.chromosome, "scaffold:7");
        assert_eq!(p.strand, Strand::Reverse);
        assert_almost_eq(p.variance, 0.0, 1e-12);
    }

    #[test]
    fn test_from_line_errors() {
        assert!(Profile::from_line("chr1_100_103\t1\t2").is_err());
        assert!(Profile::from_line("chr1:100-103:*\t1\t2\t3\t4").is_err());
        assert!(Profile::from_line("chr1:100-103:+\t1\t2\t3").is_err());
        assert!(Profile::from_line("chr1:100-103:+\t1\t2\tx\t4").is_err());
        assert!(Profile::from_line("chr1:103-100:+\t1\t2\t3\t4").is_err());
        assert!(Profile::from_line("chr1:1-3:+\tnan\tinf\t-inf").is_err());
        assert!(Profile::from_line("chr1:1-3:+\t1\t2\tinf").is_err());
        assert!(Profile::from_line("chr1:1-1:+\tNaN").is_err());
    }

    #[test]
    fn test_bed_line() {
        let mut p = Profile::from_line("chr2:10-12:-\t0\t5\t0").unwrap();
        assert_eq!(p.bed_line(), "chr2\t10\t12\tunknown\t0\t-\tNOVEL\t0");
        p.label = Some("mir-1".to_string());
        p.score = 3.0;
        p.category = Category::Known;
        p.cluster = 4;
        assert_eq!(p.bed_line(), "chr2\t10\t12\tmir-1\t3\t-\tKNOWN\t4");
    }

    #[test]
    fn test_fill_noise() {
        let mut p = Profile::from_line("chr1:1-4:+\t10\t12\t8\t10").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        p.fill_noise(500, &mut rng);
        assert_eq!(p.noise.len(), 500);
        let noise_mean = mean(&p.noise);
        assert!(noise_mean < -9.0 && noise_mean > -11.0);

        // The same seed gives the same pool.
        let mut q = p.clone();
        let mut rng = StdRng::seed_from_u64(0);
        q.fill_noise(500, &mut rng);
        assert_eq!(p.noise, q.noise);

        // Zero variance gives a constant pool.
        let mut c = Profile::from_line("chr1:1-2:+\t3\t3").unwrap();
        c.fill_noise(10, &mut rng);
        assert!(c.noise.iter().all(|&v| (v + 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_load_profiles() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("profiles.dat");
        make_test_file(&filename, "chr1:1-3:+\t1\t2\t1\n\nchr1:10-11:-\t4\t4\n");
        let mut rng = StdRng::seed_from_u64(0);
        let profiles = load_profiles(&filename, 500, Some("mmu"), &mut rng);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1].coordinate(), "chr1:10-11:-");
        assert_eq!(profiles[0].noise.len(), 500);
        assert_eq!(profiles[0].species.as_deref(), Some("mmu"));
    }

    #[test]
    fn test_load_profiles_errors() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.dat");
        make_test_file(&bad, "chr1:1-3:+\t1\t2\t1\nchr1:1-3:+\t1\t2\n");
        let result = std::panic::catch_unwind(|| {
            let mut rng = StdRng::seed_from_u64(0);
            load_profiles(&bad, 500, None, &mut rng);
        });
        assert!(result.is_err());

        let long = dir.path().join("long.dat");
        make_test_file(&long, "chr1:1-5:+\t1\t2\t3\t2\t1\n");
        let result = std::panic::catch_unwind(|| {
            let mut rng = StdRng::seed_from_u64(0);
            load_profiles(&long, 4, None, &mut rng);
        });
        assert!(result.is_err());
    }
}
