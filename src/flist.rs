/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs::{self, File};
use std::io::{BufWriter, Write};

use anyhow::{bail, Context};
use walkdir::WalkDir;

use crate::util::{get_raw_file_type, is_dot_path, path_exists, FileType};

/// Scan an input root to a flat list of regular files and symlinks.
/// Directories themselves are not included.
pub fn init_flist(input: &str, ignore_dot: bool) -> anyhow::Result<Vec<String>> {
    let mut l = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let f = entry.path().to_string_lossy().into_owned();
        let t = get_raw_file_type(&f);
        // ignore . entries if specified
        if ignore_dot && t != FileType::Dir && is_dot_path(&f) {
            continue;
        }
        if t == FileType::Reg || t == FileType::Symlink {
            l.push(f);
        }
    }
    Ok(l)
}

/// Paths are read back as is, not re-validated.
pub fn load_flist_file(flist_file: &str) -> anyhow::Result<Vec<String>> {
    let s = fs::read_to_string(flist_file)
        .with_context(|| format!("failed to read flist file {}", flist_file))?;
    Ok(s.lines().map(|x| x.to_string()).collect())
}

pub fn create_flist_file(
    input: &[String],
    flist_file: &str,
    ignore_dot: bool,
    force: bool,
) -> anyhow::Result<()> {
    if path_exists(flist_file) {
        if force {
            if get_raw_file_type(flist_file) != FileType::Reg {
                bail!("{} not regular file", flist_file);
            }
            fs::remove_file(flist_file)
                .with_context(|| format!("failed to remove {}", flist_file))?;
            println!("Removed {}", flist_file);
        } else {
            bail!("{} already exists", flist_file);
        }
    }

    let mut fl = Vec::new();
    for f in input {
        let v = init_flist(f, ignore_dot)?;
        println!("{} files scanned from {}", v.len(), f);
        fl.extend(v);
    }
    fl.sort();

    let mut writer = BufWriter::new(
        File::create(flist_file)
            .with_context(|| format!("failed to create flist file {}", flist_file))?,
    );
    for s in &fl {
        writeln!(writer, "{}", s)?;
    }
    writer.flush()?;
    Ok(())
}
