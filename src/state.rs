/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use rand::Rng;

use crate::util::{get_time_string, MAX_BUFFER_SIZE};

/// Per-worker buffers and write-path log, exclusively owned by one worker.
/// Readers are constructed with an empty write buffer and writers with an
/// empty read buffer.
pub struct ThreadDir {
    pub read_buffer: Vec<u8>,
    pub write_buffer: Vec<u8>,
    write_paths: Vec<String>,
    write_paths_counter: u64,
}

impl ThreadDir {
    fn new(rbufsiz: usize, wbufsiz: usize) -> Self {
        Self {
            read_buffer: vec![0; rbufsiz],
            write_buffer: vec![0x41; wbufsiz],
            write_paths: Vec::new(),
            write_paths_counter: 0,
        }
    }

    pub fn new_read(bufsiz: usize) -> Self {
        Self::new(bufsiz, 0)
    }

    pub fn new_write(bufsiz: usize) -> Self {
        Self::new(0, bufsiz)
    }

    pub fn num_write_paths(&self) -> usize {
        self.write_paths.len()
    }

    pub fn push_write_path(&mut self, f: String) {
        self.write_paths.push(f);
    }

    /// Drained by the dispatcher after the owning thread has been joined.
    pub fn take_write_paths(&mut self) -> Vec<String> {
        std::mem::take(&mut self.write_paths)
    }

    pub fn write_paths_counter(&self) -> u64 {
        self.write_paths_counter
    }

    pub fn inc_write_paths_counter(&mut self) {
        self.write_paths_counter += 1;
    }
}

/// Run-global state, immutable once the workers have been dispatched.
pub struct Dir {
    random_write_data: Vec<u8>,
    write_paths_ts: String,
}

impl Dir {
    pub fn new(random_write_data: bool) -> Self {
        let mut data = Vec::new();
        if random_write_data {
            // doubled so a buffer-length slice fits at any offset below the
            // buffer length
            let mut rng = rand::thread_rng();
            data = (0..MAX_BUFFER_SIZE * 2)
                .map(|_| rng.gen_range(32u8..128))
                .collect();
        }
        Self {
            random_write_data: data,
            write_paths_ts: get_time_string(),
        }
    }

    pub fn random_write_data(&self) -> &[u8] {
        &self.random_write_data
    }

    pub fn write_paths_ts(&self) -> &str {
        &self.write_paths_ts
    }
}
