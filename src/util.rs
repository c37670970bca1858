/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use anyhow::bail;
use rand::distributions::uniform::SampleUniform;
use rand::Rng;

pub const MAX_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Dir,
    Reg,
    Device,
    Symlink,
    Unsupported,
}

/// Collapse redundant separators, `.` and `..` without touching the
/// filesystem, so it also works on paths that do not exist.
pub fn lexical_normal(f: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in f.components() {
        match c {
            Component::RootDir => out.push("/"),
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::CurDir => (),
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => (), // "/.." stays "/"
                _ => out.push(".."),
            },
            Component::Normal(s) => out.push(s),
        }
    }
    if out.as_os_str().is_empty() && !f.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve symlinks for the longest existing prefix and normalise the
/// remainder lexically.
pub fn weak_canonical(f: &Path) -> PathBuf {
    let mut existing = f.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(mut resolved) = fs::canonicalize(&existing) {
            for name in rest.iter().rev() {
                resolved.push(name);
            }
            return lexical_normal(&resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return lexical_normal(f),
        }
    }
}

pub fn get_abspath(f: &str) -> anyhow::Result<String> {
    let p = weak_canonical(Path::new(f));
    let p = if p.is_absolute() {
        p
    } else {
        lexical_normal(&std::env::current_dir()?.join(p))
    };
    Ok(p.to_string_lossy().into_owned())
}

pub fn get_dirpath(f: &str) -> String {
    let p = lexical_normal(Path::new(f));
    match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_string_lossy().into_owned(),
        Some(_) => ".".to_string(),
        None => p.to_string_lossy().into_owned(),
    }
}

pub fn get_basename(f: &str) -> String {
    lexical_normal(Path::new(f))
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_abspath(f: &str) -> bool {
    Path::new(f).is_absolute()
}

pub fn join_path(f1: &str, f2: &str) -> String {
    lexical_normal(&Path::new(f1).join(f2))
        .to_string_lossy()
        .into_owned()
}

pub fn is_windows() -> bool {
    cfg!(windows)
}

pub fn get_path_separator() -> char {
    std::path::MAIN_SEPARATOR
}

fn mode_type(t: fs::FileType) -> FileType {
    use std::os::unix::fs::FileTypeExt;
    if t.is_dir() {
        FileType::Dir
    } else if t.is_file() {
        FileType::Reg
    } else if t.is_symlink() {
        FileType::Symlink
    } else if t.is_block_device() || t.is_char_device() {
        FileType::Device
    } else {
        FileType::Unsupported
    }
}

/// File type of the entry itself, symlinks are not followed.
pub fn get_raw_file_type(f: &str) -> FileType {
    match fs::symlink_metadata(f) {
        Ok(m) => mode_type(m.file_type()),
        Err(_) => FileType::Unsupported,
    }
}

/// File type with symlinks followed, never returns `Symlink`.
pub fn get_file_type(f: &str) -> FileType {
    match fs::metadata(f) {
        Ok(m) => mode_type(m.file_type()),
        Err(_) => FileType::Unsupported,
    }
}

// fs::metadata based probes resolve symlinks, test the entry itself instead
pub fn path_exists(f: &str) -> bool {
    fs::symlink_metadata(f).is_ok()
}

pub fn is_dot_path(f: &str) -> bool {
    get_basename(f).starts_with('.') || f.contains("/.")
}

/// Probe writability by creating and removing a uniquely named directory
/// under the target.
pub fn is_dir_writable(f: &str) -> anyhow::Result<bool> {
    if get_raw_file_type(f) != FileType::Dir {
        bail!("{} not directory", f);
    }
    let x = join_path(f, &format!("dirload_write_test_{}", get_time_string()));
    if fs::create_dir(&x).is_err() {
        return Ok(false); // assume readonly
    }
    Ok(fs::remove_dir(&x).is_ok())
}

pub fn remove_dup_string(input: &[String]) -> Vec<String> {
    let mut l: Vec<String> = Vec::new();
    for a in input {
        if !l.contains(a) {
            l.push(a.clone());
        }
    }
    l
}

pub fn get_time_string() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Uniformly distributed value in `[beg, end)`.
pub fn random<T>(beg: T, end: T) -> T
where
    T: SampleUniform + PartialOrd + Copy,
{
    assert!(beg < end);
    rand::thread_rng().gen_range(beg..end)
}

/// Polling gate over a wall-clock budget. The clock is only consulted every
/// `frequency` calls, per-entry work is assumed cheap and clock reads are not.
pub struct Timer {
    time_begin: Instant,
    duration: i64,
    frequency: i64,
    counter: i64,
}

impl Timer {
    pub fn new(duration: i64, frequency: i64) -> Self {
        Self {
            time_begin: Instant::now(),
            duration,
            frequency,
            counter: 0,
        }
    }

    pub fn elapsed(&mut self) -> bool {
        if self.duration == 0 {
            return false; // consider 0 as unused
        }
        self.counter += 1;
        if self.frequency == 0 || self.counter % self.frequency == 0 {
            self.time_begin.elapsed().as_secs() as i64 >= self.duration
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.time_begin = Instant::now();
    }
}
