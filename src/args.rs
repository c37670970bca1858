/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use clap::Parser;

/// Filesystem load generator.
///
/// clap's built-in help and version are disabled because both must exit
/// with status 1.
#[derive(Parser, Debug)]
#[command(name = "dirload", disable_help_flag = true, disable_version_flag = true)]
pub struct Args {
    /// Input directories
    #[arg(value_name = "paths")]
    pub paths: Vec<String>,

    /// Number of sets to run
    #[arg(long = "num_set", default_value_t = 1)]
    pub num_set: u64,

    /// Number of reader threads
    #[arg(long = "num_reader", default_value_t = 0)]
    pub num_reader: u64,

    /// Number of writer threads
    #[arg(long = "num_writer", default_value_t = 0)]
    pub num_writer: u64,

    /// Exit threads after specified iterations if > 0
    #[arg(long = "num_repeat", default_value_t = -1)]
    pub num_repeat: i64,

    /// Exit threads after sum of this and --time_second option if > 0
    #[arg(long = "time_minute", default_value_t = 0)]
    pub time_minute: i64,

    /// Exit threads after sum of this and --time_minute option if > 0
    #[arg(long = "time_second", default_value_t = 0)]
    pub time_second: i64,

    /// Monitor threads every sum of this and --monitor_interval_second option if > 0
    #[arg(long = "monitor_interval_minute", default_value_t = 0)]
    pub monitor_interval_minute: i64,

    /// Monitor threads every sum of this and --monitor_interval_minute option if > 0
    #[arg(long = "monitor_interval_second", default_value_t = 0)]
    pub monitor_interval_second: i64,

    /// Do not read file data
    #[arg(long = "stat_only")]
    pub stat_only: bool,

    /// Ignore entries start with .
    #[arg(long = "ignore_dot")]
    pub ignore_dot: bool,

    /// Follow symbolic links for read unless directory
    #[arg(long = "follow_symlink")]
    pub follow_symlink: bool,

    /// Read buffer size
    #[arg(long = "read_buffer_size", default_value_t = 65536)]
    pub read_buffer_size: u64,

    /// Read residual size per file read, use < read_buffer_size random size if 0
    #[arg(long = "read_size", default_value_t = -1)]
    pub read_size: i64,

    /// Write buffer size
    #[arg(long = "write_buffer_size", default_value_t = 65536)]
    pub write_buffer_size: u64,

    /// Write residual size per file write, use < write_buffer_size random size if 0
    #[arg(long = "write_size", default_value_t = -1)]
    pub write_size: i64,

    /// Use pseudo random write data
    #[arg(long = "random_write_data")]
    pub random_write_data: bool,

    /// Exit writer threads after creating specified files or directories if > 0
    #[arg(long = "num_write_paths", default_value_t = 1024)]
    pub num_write_paths: i64,

    /// Truncate write paths for regular files instead of write
    #[arg(long = "truncate_write_paths")]
    pub truncate_write_paths: bool,

    /// fsync(2) write paths
    #[arg(long = "fsync_write_paths")]
    pub fsync_write_paths: bool,

    /// fsync(2) parent directories of write paths
    #[arg(long = "dirsync_write_paths")]
    pub dirsync_write_paths: bool,

    /// Do not unlink write paths after writer threads exit
    #[arg(long = "keep_write_paths")]
    pub keep_write_paths: bool,

    /// Unlink existing write paths and exit
    #[arg(long = "clean_write_paths")]
    pub clean_write_paths: bool,

    /// Base name for write paths
    #[arg(long = "write_paths_base", default_value = "x")]
    pub write_paths_base: String,

    /// File types for write paths [d|r|s|l]
    #[arg(long = "write_paths_type", default_value = "dr")]
    pub write_paths_type: String,

    /// <paths> iteration type [walk|ordered|reverse|random]
    #[arg(long = "path_iter", default_value = "ordered")]
    pub path_iter: String,

    /// Path to flist file
    #[arg(long = "flist_file", default_value = "")]
    pub flist_file: String,

    /// Create flist file and exit
    #[arg(long = "flist_file_create")]
    pub flist_file_create: bool,

    /// Enable force mode
    #[arg(long)]
    pub force: bool,

    /// Enable verbose print
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug mode
    #[arg(long)]
    pub debug: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Print usage and exit
    #[arg(short = 'h', long = "help")]
    pub help: bool,

    /// Print build options and exit
    #[arg(short = 'x', hide = true)]
    pub build_options: bool,

    /// Run self checks and exit
    #[arg(short = 'X', hide = true)]
    pub selftest: bool,
}
