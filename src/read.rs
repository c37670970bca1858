/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs::{self, File};
use std::io::Read;

use anyhow::{bail, Context};

use crate::config::Config;
use crate::util::{
    get_dirpath, get_file_type, get_raw_file_type, is_abspath, is_dot_path, join_path, random,
    FileType,
};
use crate::worker::Worker;

impl Worker {
    /// Consume one entry for read: stat it, resolve a symlink when required,
    /// and read regular file data within the residual budget.
    pub fn read_entry(&mut self, f: &str, cfg: &Config) -> anyhow::Result<()> {
        debug_assert!(is_abspath(f) && !f.ends_with('/'));
        let mut t = get_raw_file_type(f);

        // stats by the path iteration itself are not counted
        self.stat.inc_num_stat();

        // ignore . entries if specified
        if cfg.ignore_dot && t != FileType::Dir && is_dot_path(f) {
            return Ok(());
        }

        // beyond this is for file read
        if cfg.stat_only {
            return Ok(());
        }

        // find target if symlink
        let mut x = f.to_string();
        if t == FileType::Symlink {
            let target = fs::read_link(f).with_context(|| format!("failed to readlink {}", f))?;
            self.stat.add_num_read_bytes(target.as_os_str().len() as u64);
            x = target.to_string_lossy().into_owned();
            if !is_abspath(&x) {
                x = join_path(&get_dirpath(f), &x);
                debug_assert!(is_abspath(&x));
            }
            t = get_file_type(&x); // update type
            self.stat.inc_num_stat(); // count twice for symlink
            if !cfg.follow_symlink {
                return Ok(());
            }
        }

        match t {
            FileType::Reg => self.read_file(f, cfg),
            FileType::Dir | FileType::Device | FileType::Unsupported => Ok(()),
            // the filesystem resolves symlink chains in one step
            FileType::Symlink => bail!("{} is symlink", x),
        }
    }

    fn read_file(&mut self, f: &str, cfg: &Config) -> anyhow::Result<()> {
        let bufsiz = self.dir.read_buffer.len();
        let mut resid = cfg.read_size; // negative resid means read until EOF
        if resid == 0 {
            resid = random(0, bufsiz as i64) + 1;
            debug_assert!(resid > 0 && resid <= bufsiz as i64);
        }
        debug_assert!(resid == -1 || resid > 0);

        let mut fp = File::open(f).with_context(|| format!("failed to open {}", f))?;
        loop {
            // cut read size if > positive residual
            let mut n = bufsiz;
            if resid > 0 {
                n = n.min(resid as usize);
            }

            let siz = fp.read(&mut self.dir.read_buffer[..n])?;
            self.stat.inc_num_read();
            self.stat.add_num_read_bytes(siz as u64);
            if siz == 0 {
                break;
            }

            // end if positive residual becomes <= 0
            if resid > 0 {
                resid -= siz as i64;
                if resid <= 0 {
                    debug_assert_eq!(resid, 0);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use clap::Parser;

    use super::*;
    use crate::args::Args;

    // tempfile's default .tmp prefix would make every path a dot path
    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("dirload-test")
            .tempdir()
            .unwrap()
    }

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["dirload"];
        argv.extend(extra);
        Config::from_args(&Args::parse_from(argv)).unwrap()
    }

    #[test]
    fn test_read_entry_regular() {
        let dir = tempdir();
        let f = dir.path().join("f");
        fs::write(&f, vec![0x61; 10000]).unwrap();
        let f = f.to_string_lossy().into_owned();

        let cfg = config(&["--num_reader=1"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&f, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 1);
        // 10000 bytes via 4096 buffer plus the final empty read
        assert_eq!(worker.stat.num_read(), 4);
        assert_eq!(worker.stat.num_read_bytes(), 10000);
    }

    #[test]
    fn test_read_entry_budget() {
        let dir = tempdir();
        let f = dir.path().join("f");
        fs::write(&f, vec![0x61; 10000]).unwrap();
        let f = f.to_string_lossy().into_owned();

        let cfg = config(&["--num_reader=1", "--read_size=100"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&f, &cfg).unwrap();
        assert_eq!(worker.stat.num_read(), 1);
        assert_eq!(worker.stat.num_read_bytes(), 100);

        // random budget is bounded by the buffer size
        let cfg = config(&["--num_reader=1", "--read_size=0"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&f, &cfg).unwrap();
        let bytes = worker.stat.num_read_bytes();
        assert!(bytes >= 1 && bytes <= 4096, "{}", bytes);
    }

    #[test]
    fn test_read_entry_stat_only() {
        let dir = tempdir();
        let f = dir.path().join("f");
        fs::write(&f, b"xxx").unwrap();
        let f = f.to_string_lossy().into_owned();

        let cfg = config(&["--num_reader=1", "--stat_only"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&f, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 1);
        assert_eq!(worker.stat.num_read(), 0);
        assert_eq!(worker.stat.num_read_bytes(), 0);
    }

    #[test]
    fn test_read_entry_ignore_dot() {
        let dir = tempdir();
        let f = dir.path().join(".hidden");
        fs::write(&f, b"xxx").unwrap();
        let f = f.to_string_lossy().into_owned();

        let cfg = config(&["--num_reader=1", "--ignore_dot"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&f, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 1);
        assert_eq!(worker.stat.num_read(), 0);
    }

    #[test]
    fn test_read_entry_symlink() {
        let dir = tempdir();
        let f = dir.path().join("f");
        fs::write(&f, vec![0x61; 100]).unwrap();
        let link = dir.path().join("s");
        symlink("f", &link).unwrap(); // relative target
        let link = link.to_string_lossy().into_owned();

        // symlinks are stat'd twice, target length counts as read bytes
        let cfg = config(&["--num_reader=1"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&link, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 2);
        assert_eq!(worker.stat.num_read(), 0);
        assert_eq!(worker.stat.num_read_bytes(), 1);

        let cfg = config(&["--num_reader=1", "--follow_symlink"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&link, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 2);
        assert_eq!(worker.stat.num_read_bytes(), 1 + 100);
    }

    #[test]
    fn test_read_entry_other_types() {
        let dir = tempdir();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let sub = sub.to_string_lossy().into_owned();

        let cfg = config(&["--num_reader=1"]);
        let mut worker = Worker::new_read(0, 4096, "/".to_string());
        worker.read_entry(&sub, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 1);
        assert_eq!(worker.stat.num_read(), 0);

        // nonexistent entries classify as unsupported and are skipped
        let gone = dir.path().join("gone").to_string_lossy().into_owned();
        worker.read_entry(&gone, &cfg).unwrap();
        assert_eq!(worker.stat.num_stat(), 2);
    }
}
