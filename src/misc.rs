// This file contains miscellaneous functions used by various parts of srnaclust.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, create_dir_all};
use std::io::{prelude::*, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;


pub fn create_dir(dir_path: &PathBuf) {
    match create_dir_all(dir_path) {
        Ok(_) => {},
        Err(e) => quit_with_error(&format!("failed to create directory {}\n{}", dir_path.display(), e)),
    }
}


pub fn check_if_file_exists(filename: &PathBuf) {
    // Quits with an error if the given path is not an existing file.
    let path = Path::new(filename);
    if !path.exists() {
        quit_with_error(&format!("file does not exist: {}", path.display()));
    }
    if !path.is_file() {
        quit_with_error(&format!("{} is not a file", path.display()));
    }
}


pub fn check_if_dir_is_not_dir(dir: &PathBuf) {
    // Quits with an error if the given path exists but is not a directory (not existing is okay).
    if dir.exists() && !dir.is_dir() {
        quit_with_error(&format!("{} exists but is not a directory", dir.display()));
    }
}


#[cfg(not(test))]
pub fn quit_with_error(text: &str) -> ! {
    // For friendly error messages, this function normally just prints the error and quits.
    eprintln!();
    eprintln!("Error: {}", text);
    std::process::exit(1);
}
#[cfg(test)]
pub fn quit_with_error(text: &str) -> ! {
    // But when running unit tests, this function instead panics so I can catch it for the test.
    panic!("{}", text);
}


pub fn load_file_lines(filename: &Path) -> Vec<String> {
    // Loads all lines of a text file into memory. Gzipped files are decompressed on the fly. Blank
    // lines are kept so that line numbers in error messages match the file.
    let file = File::open(filename).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to open file {}\n{}", filename.display(), e));
    });
    let reader: Box<dyn Read> = if is_file_gzipped(filename) { Box::new(MultiGzDecoder::new(file)) }
                                                        else { Box::new(file) };
    BufReader::new(reader).lines().map(|line_result| {
        line_result.unwrap_or_else(|e| {
            quit_with_error(&format!("failed to read line from {}\n{}", filename.display(), e));
        })
    }).collect()
}


fn is_file_gzipped(filename: &Path) -> bool {
    // Returns true if the file appears to be gzipped (based on the first two bytes). Files too
    // small to hold the magic number are treated as plain text.
    let file = match File::open(filename) {
        Ok(f) => f,
        Err(e) => quit_with_error(&format!("unable to open {}\n{}", filename.display(), e)),
    };
    let mut reader = BufReader::new(file);
    let mut buf = vec![0u8; 2];
    match reader.read_exact(&mut buf) {
        Ok(_)  => buf[0] == 31 && buf[1] == 139,
        Err(_) => false,
    }
}


pub fn format_float(num: f64) -> String {
    // Formats a float with up to six decimal places but then drops trailing zeros.
    let mut formatted = format!("{:.6}", num);
    if !formatted.contains('.') { return formatted }
    while formatted.ends_with('0') { formatted.pop(); }
    if formatted.ends_with('.') { formatted.pop(); }
    formatted
}


pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { return 0.0; }
    values.iter().sum::<f64>() / values.len() as f64
}


pub fn variance(values: &[f64]) -> f64 {
    // Sample variance (n - 1 denominator). A single value has no spread, so it gets 0.
    if values.len() < 2 { return 0.0; }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}


pub fn quantile_from_sorted(sorted_values: &[f64], fraction: f64) -> f64 {
    // Linear interpolation between the two order statistics around fraction * (n - 1). The input
    // must already be sorted in ascending order.
    if sorted_values.is_empty() { return 0.0; }
    let position = fraction * (sorted_values.len() - 1) as f64;
    let lower = position.floor() as usize;
    if lower + 1 >= sorted_values.len() {
        return sorted_values[sorted_values.len() - 1];
    }
    let delta = position - lower as f64;
    (1.0 - delta) * sorted_values[lower] + delta * sorted_values[lower + 1]
}


pub fn spinner(message: &str) -> ProgressBar {
    if cfg!(test) {
        ProgressBar::hidden() // don't show a spinner during unit tests
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])  // dots3 from github.com/sindresorhus/cli-spinners
                .template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb
    }
}
