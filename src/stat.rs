/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-worker statistics. Counters are written by the owning worker only,
/// but the monitor reads them live and refreshes `time_end` on workers it
/// observes as not done. Relaxed atomics carry that tolerated race, the
/// values are advisory.
#[derive(Debug)]
pub struct ThreadStat {
    is_reader: bool,
    input_path: String,
    origin: Instant,
    time_begin_ms: AtomicU64,
    time_end_ms: AtomicU64,
    num_repeat: AtomicU64,
    num_stat: AtomicU64,
    num_read: AtomicU64,
    num_read_bytes: AtomicU64,
    num_write: AtomicU64,
    num_write_bytes: AtomicU64,
    done: AtomicBool,
}

impl ThreadStat {
    fn new(is_reader: bool) -> Self {
        Self {
            is_reader,
            input_path: String::new(),
            origin: Instant::now(),
            time_begin_ms: AtomicU64::new(0),
            time_end_ms: AtomicU64::new(0),
            num_repeat: AtomicU64::new(0),
            num_stat: AtomicU64::new(0),
            num_read: AtomicU64::new(0),
            num_read_bytes: AtomicU64::new(0),
            num_write: AtomicU64::new(0),
            num_write_bytes: AtomicU64::new(0),
            done: AtomicBool::new(false),
        }
    }

    pub fn new_read() -> Self {
        Self::new(true)
    }

    pub fn new_write() -> Self {
        Self::new(false)
    }

    pub fn is_reader(&self) -> bool {
        self.is_reader
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    /// Assigned by the dispatcher while it still has exclusive ownership,
    /// before the stat is shared with the worker and the monitor.
    pub fn set_input_path(&mut self, f: String) {
        self.input_path = f;
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn set_time_begin(&self) {
        self.time_begin_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    pub fn set_time_end(&self) {
        self.time_end_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    // saturating, the monitor may race begin/end updates
    pub fn time_diff(&self) -> Duration {
        let begin = self.time_begin_ms.load(Ordering::Relaxed);
        let end = self.time_end_ms.load(Ordering::Relaxed);
        Duration::from_millis(end.saturating_sub(begin))
    }

    pub fn time_elapsed(&self) -> Duration {
        let begin = self.time_begin_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.now_ms().saturating_sub(begin))
    }

    pub fn sec_elapsed(&self, d: i64) -> bool {
        if d <= 0 {
            return false;
        }
        self.time_elapsed().as_secs() as i64 > d
    }

    pub fn num_repeat(&self) -> u64 {
        self.num_repeat.load(Ordering::Relaxed)
    }

    pub fn num_stat(&self) -> u64 {
        self.num_stat.load(Ordering::Relaxed)
    }

    pub fn num_read(&self) -> u64 {
        self.num_read.load(Ordering::Relaxed)
    }

    pub fn num_read_bytes(&self) -> u64 {
        self.num_read_bytes.load(Ordering::Relaxed)
    }

    pub fn num_write(&self) -> u64 {
        self.num_write.load(Ordering::Relaxed)
    }

    pub fn num_write_bytes(&self) -> u64 {
        self.num_write_bytes.load(Ordering::Relaxed)
    }

    pub fn inc_num_repeat(&self) {
        self.num_repeat.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_num_stat(&self) {
        self.num_stat.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_num_read(&self) {
        self.num_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_num_read_bytes(&self, siz: u64) {
        self.num_read_bytes.fetch_add(siz, Ordering::Relaxed);
    }

    pub fn inc_num_write(&self) {
        self.num_write.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_num_write_bytes(&self, siz: u64) {
        self.num_write_bytes.fetch_add(siz, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    pub fn set_done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }
}

/// Width-fitted statistics table, one line per worker.
pub fn print_stat(tsv: &[Arc<ThreadStat>]) {
    if tsv.is_empty() {
        return;
    }

    let num_sec: Vec<f64> = tsv
        .iter()
        .map(|ts| ts.time_diff().as_millis() as f64 / 1000.0)
        .collect();
    let num_mibs: Vec<f64> = tsv
        .iter()
        .zip(&num_sec)
        .map(|(ts, sec)| {
            let mib = (ts.num_read_bytes() + ts.num_write_bytes()) as f64 / (1 << 20) as f64;
            mib / sec
        })
        .collect();

    let columns: [(&str, Vec<String>); 9] = [
        ("repeat", tsv.iter().map(|ts| ts.num_repeat().to_string()).collect()),
        ("stat", tsv.iter().map(|ts| ts.num_stat().to_string()).collect()),
        ("read", tsv.iter().map(|ts| ts.num_read().to_string()).collect()),
        (
            "read[B]",
            tsv.iter().map(|ts| ts.num_read_bytes().to_string()).collect(),
        ),
        ("write", tsv.iter().map(|ts| ts.num_write().to_string()).collect()),
        (
            "write[B]",
            tsv.iter().map(|ts| ts.num_write_bytes().to_string()).collect(),
        ),
        ("sec", num_sec.iter().map(|x| format!("{:.2}", x)).collect()),
        ("MiB/sec", num_mibs.iter().map(|x| format!("{:.2}", x)).collect()),
        (
            "path",
            tsv.iter().map(|ts| ts.input_path().to_string()).collect(),
        ),
    ];
    let widths: Vec<usize> = columns
        .iter()
        .map(|(header, values)| {
            values
                .iter()
                .map(String::len)
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap()
        })
        .collect();
    let width_index = (tsv.len() - 1).to_string().len();

    let mut header = format!("{:w$} {:<6}", "", "type", w = 1 + width_index);
    for ((name, _), w) in columns.iter().zip(&widths) {
        header.push_str(&format!(" {:<w$}", name, w = *w));
    }
    let header = header.trim_end().to_string();
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    for (i, ts) in tsv.iter().enumerate() {
        debug_assert!(!ts.input_path().is_empty());
        let mut line = format!(
            "#{:<wi$} {:<6}",
            i,
            if ts.is_reader() { "reader" } else { "writer" },
            wi = width_index
        );
        for (j, ((_, values), w)) in columns.iter().zip(&widths).enumerate() {
            if j == columns.len() - 1 {
                line.push_str(&format!(" {:<w$}", values[i], w = *w)); // path
            } else {
                line.push_str(&format!(" {:>w$}", values[i], w = *w));
            }
        }
        println!("{}", line.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_new_read() {
        let ts = ThreadStat::new_read();
        assert!(ts.is_reader());
        assert!(ts.input_path().is_empty());
        assert_eq!(ts.num_repeat(), 0);
        assert_eq!(ts.num_stat(), 0);
        assert_eq!(ts.num_read(), 0);
        assert_eq!(ts.num_read_bytes(), 0);
        assert_eq!(ts.num_write(), 0);
        assert_eq!(ts.num_write_bytes(), 0);
        assert!(!ts.is_done());
    }

    #[test]
    fn test_new_write() {
        let ts = ThreadStat::new_write();
        assert!(!ts.is_reader());
        assert!(ts.input_path().is_empty());
        assert_eq!(ts.num_repeat(), 0);
        assert_eq!(ts.num_write(), 0);
    }

    #[test]
    fn test_set_time() {
        let ts = ThreadStat::new_read();
        assert_eq!(ts.time_diff(), Duration::ZERO);

        ts.set_time_begin();
        thread::sleep(Duration::from_millis(100));
        ts.set_time_end();
        assert!(ts.time_diff() >= Duration::from_millis(100));

        thread::sleep(Duration::from_millis(100));
        ts.set_time_end();
        assert!(ts.time_diff() >= Duration::from_millis(200));
    }

    #[test]
    fn test_time_elapsed() {
        let ts = ThreadStat::new_read();
        ts.set_time_begin();
        thread::sleep(Duration::from_millis(100));
        assert!(ts.time_elapsed() >= Duration::from_millis(100));
        assert!(!ts.sec_elapsed(1));
        assert!(!ts.sec_elapsed(0));
        assert!(!ts.sec_elapsed(-1));
    }

    #[test]
    fn test_counters() {
        let ts = ThreadStat::new_read();
        ts.inc_num_repeat();
        ts.inc_num_repeat();
        assert_eq!(ts.num_repeat(), 2);

        ts.inc_num_stat();
        assert_eq!(ts.num_stat(), 1);

        ts.inc_num_read();
        ts.inc_num_read();
        assert_eq!(ts.num_read(), 2);

        let siz = 1234;
        ts.add_num_read_bytes(siz);
        assert_eq!(ts.num_read_bytes(), siz);
        ts.add_num_read_bytes(siz);
        assert_eq!(ts.num_read_bytes(), siz * 2);
        ts.add_num_read_bytes(0);
        assert_eq!(ts.num_read_bytes(), siz * 2);

        ts.inc_num_write();
        assert_eq!(ts.num_write(), 1);
        ts.add_num_write_bytes(siz);
        ts.add_num_write_bytes(siz);
        assert_eq!(ts.num_write_bytes(), siz * 2);
    }

    #[test]
    fn test_done() {
        let ts = ThreadStat::new_write();
        assert!(!ts.is_done());
        ts.set_done();
        assert!(ts.is_done());
    }
}
