// This file contains functions for writing srnaclust's progress messages to stderr.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)

// This file is part of srnaclust. srnaclust is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. srnaclust
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with srnaclust. If not, see <http://www.gnu.org/licenses/>.

use chrono::prelude::*;
use colored::Colorize;


pub fn section_header(text: &str) {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let date = format!("({})", now);
    eprintln!();
    eprintln!("{} {}", text.bold().bright_yellow().underline(), date.dimmed());
}


pub fn explanation(text: &str) {
    let wrapped = textwrap::fill(text, terminal_width());
    eprintln!("{}", wrapped.dimmed());
    eprintln!();
}


fn terminal_width() -> usize {
    // Falls back to 80 columns when stderr isn't a terminal (e.g. redirected to a log file).
    match term_size::dimensions_stderr() {
        Some((w, _)) if w > 20 => w,
        _ => 80,
    }
}
