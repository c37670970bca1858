/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{debug, error};
use walkdir::WalkDir;

use crate::config::{Config, PathIter};
use crate::flist::{init_flist, load_flist_file};
use crate::stat::{print_stat, ThreadStat};
use crate::state::{Dir, ThreadDir};
use crate::util::{is_abspath, random, Timer};
use crate::write::cleanup_write_paths;

/// Set by the SIGINT handler, polled by every worker and the monitor.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Failure messages from workers and the monitor, flushed to stdout when the
/// program exits.
static FAILURES: Mutex<Vec<String>> = Mutex::new(Vec::new());

pub fn add_failure(s: String) {
    if let Ok(mut l) = FAILURES.lock() {
        l.push(s);
    }
}

pub fn drain_failures() -> Vec<String> {
    match FAILURES.lock() {
        Ok(mut l) => std::mem::take(&mut *l),
        Err(_) => Vec::new(),
    }
}

/// One worker thread: its buffers and write-path log, a stat record shared
/// with the monitor, and termination counters. The whole value moves into
/// the thread and is handed back through the join handle.
pub struct Worker {
    gid: u64,
    pub dir: ThreadDir,
    pub stat: Arc<ThreadStat>,
    num_complete: u64,
    num_interrupted: u64,
    num_error: u64,
}

impl Worker {
    fn new(gid: u64, dir: ThreadDir, mut stat: ThreadStat, input_path: String) -> Self {
        stat.set_input_path(input_path);
        Self {
            gid,
            dir,
            stat: Arc::new(stat),
            num_complete: 0,
            num_interrupted: 0,
            num_error: 0,
        }
    }

    pub fn new_read(gid: u64, bufsiz: usize, input_path: String) -> Self {
        Self::new(gid, ThreadDir::new_read(bufsiz), ThreadStat::new_read(), input_path)
    }

    pub fn new_write(gid: u64, bufsiz: usize, input_path: String) -> Self {
        Self::new(gid, ThreadDir::new_write(bufsiz), ThreadStat::new_write(), input_path)
    }

    pub fn gid(&self) -> u64 {
        self.gid
    }

    pub fn is_reader(&self) -> bool {
        self.stat.is_reader()
    }

    pub fn is_writer(&self) -> bool {
        !self.is_reader()
    }

    pub fn is_write_done(&self, cfg: &Config) -> bool {
        if self.is_reader() || cfg.num_write_paths <= 0 {
            false
        } else {
            self.dir.num_write_paths() >= cfg.num_write_paths as usize
        }
    }

    fn kind(&self) -> &'static str {
        if self.is_reader() {
            "reader"
        } else {
            "writer"
        }
    }

    fn debug_print_complete(&self, repeat: i64, cfg: &Config) {
        let s = format!(
            "{:?} #{} {} complete - repeat {} iswritedone {}",
            thread::current().id(),
            self.gid,
            self.kind(),
            repeat,
            self.is_write_done(cfg)
        );
        debug!("{}", s);
        if cfg.debug {
            println!("{}", s);
        }
    }

    /// Returns true when the inner iteration must stop.
    fn process_entry(
        &mut self,
        f: &str,
        dir: &Dir,
        repeat: i64,
        cfg: &Config,
    ) -> anyhow::Result<bool> {
        if self.is_reader() {
            self.read_entry(f, cfg)?;
        } else {
            self.write_entry(f, dir, cfg)?;
        }
        if is_interrupted() {
            self.num_interrupted += 1;
            return Ok(true);
        }
        if self.stat.sec_elapsed(cfg.time_second) {
            self.debug_print_complete(repeat, cfg);
            self.num_complete += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn run(&mut self, dir: &Dir, fl: &[String], cfg: &Config) -> anyhow::Result<()> {
        debug_assert_eq!(self.num_complete + self.num_interrupted + self.num_error, 0);
        let input_path = self.stat.input_path().to_string();
        let mut repeat = 0i64;

        loop {
            // either walk or select from input path
            if cfg.path_iter == PathIter::Walk {
                for entry in WalkDir::new(&input_path).min_depth(1).sort_by_file_name() {
                    let entry = entry?;
                    let f = entry.path().to_string_lossy().into_owned();
                    debug_assert!(f.starts_with(&input_path));
                    if self.process_entry(&f, dir, repeat, cfg)? {
                        break;
                    }
                }
            } else {
                for i in 0..fl.len() {
                    let idx = match cfg.path_iter {
                        PathIter::Ordered => i,
                        PathIter::Reverse => fl.len() - 1 - i,
                        PathIter::Random => random(0, fl.len() as i64) as usize,
                        PathIter::Walk => unreachable!(),
                    };
                    let f = &fl[idx];
                    debug_assert!(f.starts_with(&input_path));
                    if self.process_entry(f, dir, repeat, cfg)? {
                        break;
                    }
                }
            }
            // return if interrupted or complete
            if self.num_interrupted > 0 || self.num_complete > 0 {
                return Ok(()); // not break
            }
            // otherwise continue until num_repeat if specified
            self.stat.inc_num_repeat();
            repeat += 1;
            if cfg.num_repeat > 0 && repeat >= cfg.num_repeat {
                break; // usually only readers break from here
            }
            if self.is_writer() && self.is_write_done(cfg) {
                break;
            }
        }

        self.debug_print_complete(repeat, cfg);
        self.num_complete += 1;
        Ok(())
    }
}

fn worker_handler(mut worker: Worker, dir: &Dir, fl: &[String], cfg: &Config) -> Worker {
    if let Err(err) = worker.run(dir, fl, cfg) {
        worker.num_error += 1;
        let s = format!(
            "{:?} #{} {} - {:#}",
            thread::current().id(),
            worker.gid(),
            worker.kind(),
            err
        );
        error!("{}", s);
        println!("{}", s);
        add_failure(s);
    }
    worker.stat.set_done();
    worker.stat.set_time_end();
    worker
}

fn monitor_handler(statv: &[Arc<ThreadStat>], cfg: &Config) {
    let mut timer = Timer::new(cfg.monitor_int_second, 0);
    debug_assert!(!statv.is_empty());

    loop {
        if timer.elapsed() {
            let mut done = true;
            // ignore possible race with the owners
            for stat in statv {
                if !stat.is_done() {
                    done = false;
                    stat.set_time_end();
                }
            }
            if done {
                break; // all threads done
            }
            print_stat(statv);
            timer.reset();
        }
        if is_interrupted() {
            break;
        }
        if statv[0].sec_elapsed(cfg.time_second) {
            break;
        }
        thread::sleep(Duration::from_secs(1));
    }
}

fn setup_flist(input: &[String], cfg: &Config) -> anyhow::Result<Vec<Vec<String>>> {
    // no flist needed when walking input directories on demand
    if cfg.path_iter == PathIter::Walk {
        for f in input {
            println!("Walk {}", f);
        }
        return Ok(Vec::new());
    }

    let mut fls: Vec<Vec<String>> = vec![Vec::new(); input.len()];
    if !cfg.flist_file.is_empty() {
        // load flist from flist file
        println!("flist_file {}", cfg.flist_file);
        for s in load_flist_file(&cfg.flist_file)? {
            let mut found = false;
            for (i, f) in input.iter().enumerate() {
                if s.starts_with(f.as_str()) {
                    fls[i].push(s.clone());
                    found = true;
                    // no break, s can belong to multiple roots
                }
            }
            if !found {
                bail!("{} has no prefix in {}", s, input.join(", "));
            }
        }
    } else {
        // initialize flist by scanning input directories
        for (i, f) in input.iter().enumerate() {
            let l = init_flist(f, cfg.ignore_dot)?;
            println!("{} files scanned from {}", l.len(), f);
            fls[i] = l;
        }
    }

    // don't allow empty flist as it results in spinning loop
    for (i, fl) in fls.iter().enumerate() {
        if fl.is_empty() {
            bail!("empty flist {}", input[i]);
        }
        println!("flist {} {}", input[i], fl.len());
    }
    Ok(fls)
}

#[derive(Debug)]
pub struct DispatchResult {
    pub num_complete: u64,
    pub num_interrupted: u64,
    pub num_error: u64,
    pub num_remain: u64,
    pub stats: Vec<Arc<ThreadStat>>,
}

/// Run one set: build the pool, start the workers and the optional monitor,
/// join everything, aggregate termination counters and clean up write paths.
pub fn dispatch_worker(input: &[String], cfg: &Config) -> anyhow::Result<DispatchResult> {
    for f in input {
        debug_assert!(is_abspath(f), "{}", f);
    }

    // number of readers and writers are 0 by default
    if cfg.num_reader == 0 && cfg.num_writer == 0 {
        return Ok(DispatchResult {
            num_complete: 0,
            num_interrupted: 0,
            num_error: 0,
            num_remain: 0,
            stats: Vec::new(),
        });
    }

    let dir = Dir::new(cfg.random_write_data);

    // each worker is bound to one input root by gid
    let num_thread = cfg.num_reader + cfg.num_writer;
    let mut workers = Vec::new();
    for gid in 0..num_thread {
        let input_path = input[gid as usize % input.len()].clone();
        if gid < cfg.num_reader {
            workers.push(Worker::new_read(gid, cfg.read_buffer_size, input_path));
        } else {
            workers.push(Worker::new_write(gid, cfg.write_buffer_size, input_path));
        }
    }

    let fls = setup_flist(input, cfg)?;
    if cfg.path_iter == PathIter::Walk {
        debug_assert!(fls.is_empty());
    } else {
        debug_assert_eq!(fls.len(), input.len());
    }

    let stats: Vec<Arc<ThreadStat>> = workers.iter().map(|w| w.stat.clone()).collect();
    let empty_fl: Vec<String> = Vec::new();
    let mut joined: Vec<Worker> = Vec::new();
    let mut num_error = 0;

    thread::scope(|s| -> anyhow::Result<()> {
        let monitor = if cfg.monitor_int_second > 0 {
            let statv = stats.clone();
            let handle = thread::Builder::new()
                .name("monitor".to_string())
                .spawn_scoped(s, move || monitor_handler(&statv, cfg))
                .with_context(|| "failed to create monitor thread")?;
            debug!("monitor created");
            Some(handle)
        } else {
            None
        };

        let mut handles = Vec::new();
        for worker in workers.drain(..) {
            let gid = worker.gid();
            let fl: &[String] = if fls.is_empty() {
                &empty_fl
            } else {
                &fls[gid as usize % fls.len()]
            };
            let stat = worker.stat.clone();
            let dir = &dir;
            let handle = thread::Builder::new()
                .name(format!("worker{}", gid))
                .spawn_scoped(s, move || worker_handler(worker, dir, fl, cfg))
                .with_context(|| format!("failed to create worker thread #{}", gid))?;
            stat.set_time_begin();
            debug!("#{} created", gid);
            handles.push(handle);
        }

        for (gid, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(worker) => {
                    debug!("#{} joined", worker.gid());
                    joined.push(worker);
                }
                Err(_) => {
                    num_error += 1;
                    let s = format!("#{} worker thread panicked", gid);
                    error!("{}", s);
                    add_failure(s);
                }
            }
        }
        if let Some(handle) = monitor {
            if handle.join().is_err() {
                let s = "monitor thread panicked".to_string();
                error!("{}", s);
                add_failure(s);
            } else {
                debug!("monitor joined");
            }
        }
        Ok(())
    })?;

    // collect result
    let mut num_complete = 0;
    let mut num_interrupted = 0;
    for worker in &joined {
        num_complete += worker.num_complete;
        num_interrupted += worker.num_interrupted;
        num_error += worker.num_error;
    }
    assert_eq!(num_complete + num_interrupted + num_error, num_thread);

    let mut l: Vec<String> = Vec::new();
    for worker in joined.iter_mut() {
        l.append(&mut worker.dir.take_write_paths());
    }
    let num_remain = cleanup_write_paths(&mut l, cfg) as u64;

    Ok(DispatchResult {
        num_complete,
        num_interrupted,
        num_error,
        num_remain,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;
    use crate::args::Args;
    use crate::util::{get_basename, path_exists};
    use crate::write::collect_write_paths;

    // dispatch tests share the process-wide interrupt flag, keep them serial
    static DISPATCH_LOCK: Mutex<()> = Mutex::new(());

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        DISPATCH_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["dirload"];
        argv.extend(extra);
        Config::from_args(&Args::parse_from(argv)).unwrap()
    }

    // tempfile's default .tmp prefix would make every path a dot path
    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("dirload-test")
            .tempdir()
            .unwrap()
    }

    fn populate(n: usize) -> (tempfile::TempDir, String) {
        let dir = tempdir();
        for i in 0..n {
            fs::write(dir.path().join(format!("f{:02}", i)), vec![0x61; 100]).unwrap();
        }
        let root = dir.path().to_string_lossy().into_owned();
        (dir, root)
    }

    #[test]
    fn test_dispatch_trivial_pool() {
        let _guard = lock();
        let (_dir, root) = populate(1);
        let cfg = config(&[]);
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 0);
        assert_eq!(result.num_interrupted, 0);
        assert_eq!(result.num_error, 0);
        assert_eq!(result.num_remain, 0);
        assert!(result.stats.is_empty());
    }

    #[test]
    fn test_dispatch_reader_ordered() {
        let _guard = lock();
        let (_dir, root) = populate(10);
        let cfg = config(&["--num_reader=1", "--num_repeat=1"]);
        let result = dispatch_worker(&[root.clone()], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.num_interrupted + result.num_error, 0);
        assert_eq!(result.num_remain, 0);

        let ts = &result.stats[0];
        assert!(ts.is_reader());
        assert_eq!(ts.input_path(), root);
        assert_eq!(ts.num_repeat(), 1);
        assert!(ts.num_stat() >= 10);
        assert!(ts.num_read() >= 10);
        assert_eq!(ts.num_read_bytes(), 1000);
        assert!(ts.is_done());
    }

    #[test]
    fn test_dispatch_reader_random_repeat() {
        let _guard = lock();
        let (_dir, root) = populate(10);
        let cfg = config(&["--num_reader=1", "--num_repeat=3", "--path_iter=random"]);
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.stats[0].num_repeat(), 3);
        assert_eq!(result.stats[0].num_stat(), 30);
    }

    #[test]
    fn test_dispatch_reader_reverse() {
        let _guard = lock();
        let (_dir, root) = populate(5);
        let cfg = config(&["--num_reader=2", "--num_repeat=2", "--path_iter=reverse"]);
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 2);
        for ts in &result.stats {
            assert_eq!(ts.num_stat(), 10);
        }
    }

    #[test]
    fn test_dispatch_empty_flist() {
        let _guard = lock();
        let dir = tempdir();
        let root = dir.path().to_string_lossy().into_owned();
        let cfg = config(&["--num_reader=1"]);
        let err = dispatch_worker(&[root], &cfg).unwrap_err();
        assert!(err.to_string().contains("empty flist"), "{}", err);
    }

    #[test]
    fn test_dispatch_writer_quota() {
        let _guard = lock();
        let (dir, root) = populate(10);
        let cfg = config(&[
            "--num_writer=2",
            "--num_write_paths=4",
            "--write_paths_type=r",
            "--write_size=-1",
        ]);
        let result = dispatch_worker(&[root.clone()], &cfg).unwrap();
        assert_eq!(result.num_complete, 2);
        assert_eq!(result.num_remain, 0);
        for ts in &result.stats {
            assert!(!ts.is_reader());
            assert_eq!(ts.num_write(), 4);
        }
        // everything was removed at teardown
        assert!(collect_write_paths(&[root], &cfg).unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 10);
    }

    #[test]
    fn test_dispatch_writer_keep() {
        let _guard = lock();
        let (_dir, root) = populate(10);
        let cfg = config(&[
            "--num_writer=1",
            "--num_write_paths=2",
            "--write_paths_type=d",
            "--keep_write_paths",
        ]);
        let result = dispatch_worker(&[root.clone()], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.num_remain, 2);

        let mut l = collect_write_paths(&[root], &cfg).unwrap();
        assert_eq!(l.len(), 2);
        for f in &l {
            assert!(get_basename(f).starts_with("dirload_x_gid0_"));
        }
        crate::write::unlink_write_paths(&mut l, -1).unwrap();
    }

    #[test]
    fn test_dispatch_writer_walk() {
        let _guard = lock();
        let (_dir, root) = populate(3);
        let cfg = config(&[
            "--num_writer=1",
            "--num_write_paths=5",
            "--write_paths_type=r",
            "--path_iter=walk",
        ]);
        let result = dispatch_worker(&[root.clone()], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.num_remain, 0);
        assert!(collect_write_paths(&[root], &cfg).unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_multiple_roots() {
        let _guard = lock();
        let (_dir1, root1) = populate(3);
        let (_dir2, root2) = populate(3);
        let input = vec![root1.clone(), root2.clone()];
        let cfg = config(&["--num_reader=3", "--num_repeat=1"]);
        let result = dispatch_worker(&input, &cfg).unwrap();
        assert_eq!(result.num_complete, 3);
        assert_eq!(result.stats[0].input_path(), root1);
        assert_eq!(result.stats[1].input_path(), root2);
        assert_eq!(result.stats[2].input_path(), root1);
    }

    #[test]
    fn test_dispatch_monitor() {
        let _guard = lock();
        let (_dir, root) = populate(5);
        let cfg = config(&[
            "--num_reader=1",
            "--num_repeat=2",
            "--monitor_interval_second=1",
        ]);
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert!(result.stats[0].is_done());
    }

    #[test]
    fn test_dispatch_interrupted() {
        let _guard = lock();
        let (_dir, root) = populate(5);
        let cfg = config(&["--num_reader=2"]); // no repeat limit
        set_interrupted();
        let result = dispatch_worker(&[root], &cfg);
        INTERRUPTED.store(false, Ordering::Relaxed);
        let result = result.unwrap();
        assert_eq!(result.num_interrupted, 2);
        assert_eq!(result.num_complete + result.num_error, 0);
    }

    #[test]
    fn test_dispatch_flist_file() {
        let _guard = lock();
        let (_dir, root) = populate(4);
        let out = tempdir();
        let flist_file = out.path().join("flist").to_string_lossy().into_owned();
        crate::flist::create_flist_file(&[root.clone()], &flist_file, false, false).unwrap();

        let mut args = Args::parse_from(["dirload", "--num_reader=1", "--num_repeat=1"]);
        args.flist_file = flist_file;
        let cfg = Config::from_args(&args).unwrap();
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.stats[0].num_stat(), 4);
    }

    #[test]
    fn test_setup_flist_foreign_prefix() {
        let _guard = lock();
        let (_dir, root) = populate(2);
        let out = tempdir();
        let flist_file = out.path().join("flist").to_string_lossy().into_owned();
        fs::write(&flist_file, "/does/not/exist/f\n").unwrap();

        let mut args = Args::parse_from(["dirload", "--num_reader=1"]);
        args.flist_file = flist_file;
        let cfg = Config::from_args(&args).unwrap();
        let err = dispatch_worker(&[root], &cfg).unwrap_err();
        assert!(err.to_string().contains("no prefix"), "{}", err);
    }

    #[test]
    fn test_dispatch_unsupported_entry_skipped() {
        let _guard = lock();
        let (_dir, root) = populate(3);
        let out = tempdir();
        let flist_file = out.path().join("flist").to_string_lossy().into_owned();
        // stale flist entries classify as unsupported and are skipped
        fs::write(&flist_file, format!("{}/f99\n", root)).unwrap();

        let mut args = Args::parse_from(["dirload", "--num_reader=1", "--num_repeat=1"]);
        args.flist_file = flist_file;
        let cfg = Config::from_args(&args).unwrap();
        let result = dispatch_worker(&[root], &cfg).unwrap();
        assert_eq!(result.num_complete, 1);
        assert_eq!(result.num_error, 0);
        assert_eq!(result.stats[0].num_stat(), 1);
    }

    #[test]
    fn test_write_paths_exist_while_kept() {
        let _guard = lock();
        let (_dir, root) = populate(2);
        let cfg = config(&[
            "--num_writer=1",
            "--num_write_paths=3",
            "--write_paths_type=d",
            "--keep_write_paths",
        ]);
        let result = dispatch_worker(&[root.clone()], &cfg).unwrap();
        assert_eq!(result.num_remain, 3);
        let mut l = collect_write_paths(&[root], &cfg).unwrap();
        for f in &l {
            assert!(path_exists(f));
        }
        crate::write::unlink_write_paths(&mut l, -1).unwrap();
    }
}
