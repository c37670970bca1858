/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::str::FromStr;

use thiserror::Error;

use crate::args::Args;
use crate::util::MAX_BUFFER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePathsType {
    Dir,
    Reg,
    Symlink,
    Link, // hardlink
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathIter {
    Walk,
    Ordered,
    Reverse,
    Random,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid read buffer size {0}")]
    InvalidReadBufferSize(u64),
    #[error("invalid write buffer size {0}")]
    InvalidWriteBufferSize(u64),
    #[error("invalid read size {0}")]
    InvalidReadSize(i64),
    #[error("invalid write size {0}")]
    InvalidWriteSize(i64),
    #[error("empty write paths base")]
    EmptyWritePathsBase,
    #[error("empty write paths type")]
    EmptyWritePathsType,
    #[error("invalid write paths type {0}")]
    InvalidWritePathsType(char),
    #[error("invalid path iteration type {0}")]
    InvalidPathIter(String),
}

impl TryFrom<char> for WritePathsType {
    type Error = ConfigError;

    fn try_from(c: char) -> Result<Self, ConfigError> {
        match c {
            'd' => Ok(WritePathsType::Dir),
            'r' => Ok(WritePathsType::Reg),
            's' => Ok(WritePathsType::Symlink),
            'l' => Ok(WritePathsType::Link),
            x => Err(ConfigError::InvalidWritePathsType(x)),
        }
    }
}

impl FromStr for PathIter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "walk" => Ok(PathIter::Walk),
            "ordered" => Ok(PathIter::Ordered),
            "reverse" => Ok(PathIter::Reverse),
            "random" => Ok(PathIter::Random),
            x => Err(ConfigError::InvalidPathIter(x.to_string())),
        }
    }
}

/// Immutable run configuration, built once from the command line and shared
/// by reference with every worker and the monitor. Minute options are folded
/// into their second counterparts here.
pub struct Config {
    pub num_set: u64,
    pub num_reader: u64,
    pub num_writer: u64,
    pub num_repeat: i64,
    pub time_second: i64,
    pub monitor_int_second: i64,
    pub stat_only: bool,
    pub ignore_dot: bool,
    pub follow_symlink: bool,
    pub read_buffer_size: usize,
    pub read_size: i64,
    pub write_buffer_size: usize,
    pub write_size: i64,
    pub random_write_data: bool,
    pub num_write_paths: i64,
    pub truncate_write_paths: bool,
    pub fsync_write_paths: bool,
    pub dirsync_write_paths: bool,
    pub keep_write_paths: bool,
    pub clean_write_paths: bool,
    pub write_paths_base: String,
    pub write_paths_type: Vec<WritePathsType>,
    pub path_iter: PathIter,
    pub flist_file: String,
    pub flist_file_create: bool,
    pub force: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut num_repeat = args.num_repeat;
        if num_repeat == 0 || num_repeat < -1 {
            num_repeat = -1;
        }

        if args.read_buffer_size > MAX_BUFFER_SIZE as u64 {
            return Err(ConfigError::InvalidReadBufferSize(args.read_buffer_size));
        }
        if args.write_buffer_size > MAX_BUFFER_SIZE as u64 {
            return Err(ConfigError::InvalidWriteBufferSize(args.write_buffer_size));
        }

        let mut read_size = args.read_size;
        if read_size < -1 {
            read_size = -1;
        } else if read_size > MAX_BUFFER_SIZE as i64 {
            return Err(ConfigError::InvalidReadSize(read_size));
        }
        let mut write_size = args.write_size;
        if write_size < -1 {
            write_size = -1;
        } else if write_size > MAX_BUFFER_SIZE as i64 {
            return Err(ConfigError::InvalidWriteSize(write_size));
        }

        let mut num_write_paths = args.num_write_paths;
        if num_write_paths < -1 {
            num_write_paths = -1;
        }

        if args.write_paths_base.is_empty() {
            return Err(ConfigError::EmptyWritePathsBase);
        }
        let mut write_paths_base = args.write_paths_base.clone();
        if let Ok(n) = write_paths_base.parse::<u64>() {
            write_paths_base = "x".repeat(n as usize);
            println!("Using base name {} for write paths", write_paths_base);
        }

        if args.write_paths_type.is_empty() {
            return Err(ConfigError::EmptyWritePathsType);
        }
        let write_paths_type = args
            .write_paths_type
            .chars()
            .map(WritePathsType::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut path_iter = args.path_iter.parse::<PathIter>()?;
        // using flist file means not walking input directories
        if !args.flist_file.is_empty() && path_iter == PathIter::Walk {
            path_iter = PathIter::Ordered;
            println!("Using flist, force --path_iter=ordered");
        }

        Ok(Self {
            num_set: args.num_set,
            num_reader: args.num_reader,
            num_writer: args.num_writer,
            num_repeat,
            time_second: args.time_second + args.time_minute * 60,
            monitor_int_second: args.monitor_interval_second + args.monitor_interval_minute * 60,
            stat_only: args.stat_only,
            ignore_dot: args.ignore_dot,
            follow_symlink: args.follow_symlink,
            read_buffer_size: args.read_buffer_size as usize,
            read_size,
            write_buffer_size: args.write_buffer_size as usize,
            write_size,
            random_write_data: args.random_write_data,
            num_write_paths,
            truncate_write_paths: args.truncate_write_paths,
            fsync_write_paths: args.fsync_write_paths,
            dirsync_write_paths: args.dirsync_write_paths,
            keep_write_paths: args.keep_write_paths,
            clean_write_paths: args.clean_write_paths,
            write_paths_base,
            write_paths_type,
            path_iter,
            flist_file: args.flist_file.clone(),
            flist_file_create: args.flist_file_create,
            force: args.force,
            verbose: args.verbose,
            debug: args.debug,
        })
    }
}
