/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs as unix_fs;

use anyhow::{bail, Context};
use log::error;
use walkdir::WalkDir;

use crate::config::{Config, WritePathsType};
use crate::state::Dir;
use crate::util::{
    get_basename, get_dirpath, get_raw_file_type, is_abspath, is_dot_path, join_path, path_exists,
    random, remove_dup_string, FileType,
};
use crate::worker::Worker;

const WRITE_PATHS_PREFIX: &str = "dirload";

pub fn get_write_paths_base(cfg: &Config) -> String {
    format!("{}_{}", WRITE_PATHS_PREFIX, cfg.write_paths_base)
}

impl Worker {
    /// Consume one entry for write: synthesize a new path under it and create
    /// an inode of a randomly chosen permitted type.
    pub fn write_entry(&mut self, f: &str, dir: &Dir, cfg: &Config) -> anyhow::Result<()> {
        debug_assert!(is_abspath(f) && !f.ends_with('/'));
        let t = get_raw_file_type(f);

        // stats by the path iteration itself are not counted
        self.stat.inc_num_stat();

        // ignore . entries if specified
        if cfg.ignore_dot && t != FileType::Dir && is_dot_path(f) {
            return Ok(());
        }

        match t {
            FileType::Dir => self.write_file(f, f, dir, cfg),
            FileType::Reg => self.write_file(&get_dirpath(f), f, dir, cfg),
            FileType::Device | FileType::Symlink | FileType::Unsupported => Ok(()),
        }
    }

    fn write_file(&mut self, d: &str, f: &str, dir: &Dir, cfg: &Config) -> anyhow::Result<()> {
        if self.is_write_done(cfg) {
            return Ok(());
        }

        // construct a write path
        // XXX too long (easily hits ENAMETOOLONG with walk)
        let newb = format!(
            "{}_gid{}_{}_{}",
            get_write_paths_base(cfg),
            self.gid(),
            dir.write_paths_ts(),
            self.dir.write_paths_counter()
        );
        self.dir.inc_write_paths_counter();
        let newf = join_path(d, &newb);

        // create an inode
        let i = random(0, cfg.write_paths_type.len() as i64) as usize;
        let t = cfg.write_paths_type[i];
        create_inode(f, &newf, t)?;
        if cfg.fsync_write_paths {
            fsync_inode(&newf)?;
        }
        if cfg.dirsync_write_paths {
            fsync_inode(d)?;
        }

        // register the write path, and return unless regular file
        self.dir.push_write_path(newf.clone());
        if t != WritePathsType::Reg {
            self.stat.inc_num_write();
            return Ok(());
        }

        let bufsiz = self.dir.write_buffer.len();
        let mut resid = cfg.write_size; // negative resid means no write
        if resid < 0 {
            self.stat.inc_num_write();
            return Ok(());
        } else if resid == 0 {
            resid = random(0, bufsiz as i64) + 1;
            debug_assert!(resid > 0 && resid <= bufsiz as i64);
        }
        debug_assert!(resid > 0);

        if cfg.truncate_write_paths {
            let fp = OpenOptions::new()
                .write(true)
                .open(&newf)
                .with_context(|| format!("failed to open {}", newf))?;
            fp.set_len(resid as u64)?;
            self.stat.inc_num_write();
            if cfg.fsync_write_paths {
                fsync_inode(&newf)?;
            }
            return Ok(());
        }

        // start write
        let mut fp = File::create(&newf).with_context(|| format!("failed to open {}", newf))?;
        loop {
            // cut write size if > residual
            let n = bufsiz.min(resid as usize);
            if cfg.random_write_data {
                let template = dir.random_write_data();
                let i = random(0, bufsiz as i64) as usize;
                self.dir.write_buffer.copy_from_slice(&template[i..i + bufsiz]);
            }

            fp.write_all(&self.dir.write_buffer[..n])?;
            self.stat.inc_num_write();
            self.stat.add_num_write_bytes(n as u64);

            // end if residual becomes <= 0
            resid -= n as i64;
            if resid <= 0 {
                debug_assert_eq!(resid, 0);
                break;
            }
        }

        if cfg.fsync_write_paths {
            fp.flush()?; // stream level flush, the inode was synced above
        }
        Ok(())
    }
}

fn create_inode(oldf: &str, newf: &str, t: WritePathsType) -> anyhow::Result<()> {
    let mut t = t;
    if t == WritePathsType::Link {
        if get_raw_file_type(oldf) == FileType::Reg {
            fs::hard_link(oldf, newf)
                .with_context(|| format!("failed to link {} to {}", oldf, newf))?;
            return Ok(());
        }
        t = WritePathsType::Dir; // create a directory instead
    }
    match t {
        WritePathsType::Dir => {
            fs::create_dir(newf).with_context(|| format!("failed to create {}", newf))?
        }
        WritePathsType::Reg => {
            File::create(newf).with_context(|| format!("failed to create {}", newf))?;
        }
        WritePathsType::Symlink => {
            unix_fs::symlink(oldf, newf)
                .with_context(|| format!("failed to symlink {} to {}", oldf, newf))?
        }
        WritePathsType::Link => unreachable!(),
    }
    Ok(())
}

fn fsync_inode(f: &str) -> anyhow::Result<()> {
    // read-only handle, closed on drop on both paths
    let fp = File::open(f).with_context(|| format!("failed to open {}", f))?;
    fp.sync_all().with_context(|| format!("failed to fsync {}", f))?;
    Ok(())
}

/// Merge per-worker write-path logs and unlink them unless asked to keep.
/// Returns the number of paths remaining on the filesystem.
pub fn cleanup_write_paths(l: &mut Vec<String>, cfg: &Config) -> usize {
    if !cfg.keep_write_paths {
        if let Err(err) = unlink_write_paths(l, -1) {
            error!("{:#}", err);
        }
    }
    l.len()
}

/// Unlink at most `count` entries, all of them when `count <= 0`. Entries are
/// removed in reverse lexicographic order so children go before parents;
/// whatever could not be removed is left in the list.
pub fn unlink_write_paths(l: &mut Vec<String>, count: i64) -> anyhow::Result<()> {
    let mut n = l.len();
    if count > 0 {
        n = n.min(count as usize);
    }
    println!("Unlink {} write paths", n);
    l.sort();

    while n > 0 {
        let f = match l.last() {
            Some(f) => f.clone(),
            None => break,
        };
        match get_raw_file_type(&f) {
            FileType::Dir => {
                debug_assert!(path_exists(&f));
                fs::remove_dir(&f).with_context(|| format!("failed to remove {}", f))?;
            }
            FileType::Reg => {
                debug_assert!(path_exists(&f));
                fs::remove_file(&f).with_context(|| format!("failed to remove {}", f))?;
            }
            FileType::Symlink => {
                // remove the link itself, never resolve the target
                fs::remove_file(&f).with_context(|| format!("failed to remove {}", f))?;
            }
            FileType::Device | FileType::Unsupported => bail!("invalid write path {}", f),
        }
        l.pop();
        n -= 1;
    }
    Ok(())
}

/// Out-of-band scan for write paths left behind by previous runs.
pub fn collect_write_paths(input: &[String], cfg: &Config) -> anyhow::Result<Vec<String>> {
    let b = get_write_paths_base(cfg);
    let mut l = Vec::new();
    for f in remove_dup_string(input) {
        for entry in WalkDir::new(&f).min_depth(1) {
            let entry = entry?;
            let x = entry.path().to_string_lossy().into_owned();
            match get_raw_file_type(&x) {
                FileType::Dir | FileType::Reg | FileType::Symlink => {
                    if get_basename(&x).starts_with(&b) {
                        l.push(x);
                    }
                }
                FileType::Device | FileType::Unsupported => (),
            }
        }
    }
    Ok(l)
}
