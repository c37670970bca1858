/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::process;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use log::debug;

use args::Args;
use config::Config;
use flist::create_flist_file;
use stat::print_stat;
use util::{
    get_abspath, get_path_separator, get_raw_file_type, is_dir_writable, is_dot_path, is_windows,
    random, remove_dup_string, FileType, Timer,
};
use worker::dispatch_worker;
use write::{collect_write_paths, unlink_write_paths};

mod args;
mod config;
mod flist;
mod logger;
mod read;
mod stat;
mod state;
mod util;
mod worker;
mod write;

fn main() {
    let status = run();
    for s in worker::drain_failures() {
        println!("{}", s);
    }
    if let Err(err) = status {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}

fn print_build_options() {
    println!("Build options:");
    println!("  version {}", env!("CARGO_PKG_VERSION"));
    if cfg!(debug_assertions) {
        println!("  debug-assertions");
    }
    println!("  target_os {}", std::env::consts::OS);
}

/// Quick smoke checks of the pure utilities, the full suite is `cargo test`.
fn selftest() -> i32 {
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("ok {}", name);
        } else {
            println!("FAIL {}", name);
            failed += 1;
        }
    };

    check("random", (0..1000).all(|_| (0..10).contains(&random(0, 10))));
    check(
        "abspath",
        get_abspath("/..").map(|f| f == "/").unwrap_or(false),
    );
    check(
        "dot_path",
        is_dot_path("/path/to/.git/xxx") && !is_dot_path("/path/to/xxx"),
    );
    check("timer", !Timer::new(0, 0).elapsed());
    check("dedup", {
        let l: Vec<String> = ["a", "b", "a"].iter().map(|s| s.to_string()).collect();
        remove_dup_string(&l) == l[..2].to_vec()
    });
    check("file_type", get_raw_file_type("/") == FileType::Dir);
    failed
}

fn run() -> anyhow::Result<()> {
    // usage errors must exit with status 1, clap defaults to 2
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            err.print()?;
            process::exit(1);
        }
    };
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        process::exit(1);
    }
    if args.help {
        Args::command().print_help()?;
        process::exit(1);
    }
    if args.build_options {
        print_build_options();
        process::exit(0);
    }
    if args.selftest {
        process::exit(selftest());
    }

    let cfg = Config::from_args(&args)?;
    logger::init(cfg.verbose, cfg.debug)?;
    debug!("init logger");

    if is_windows() {
        bail!("Windows unsupported");
    }
    let sep = get_path_separator();
    if sep != '/' {
        bail!("invalid path separator {}", sep);
    }

    if args.paths.is_empty() {
        Args::command().print_help()?;
        process::exit(1);
    }

    // only allow directories since now that write is supported
    let mut input = Vec::new();
    for (i, f) in args.paths.iter().enumerate() {
        let absf = get_abspath(f)?;
        debug_assert!(!absf.ends_with('/'));
        if get_raw_file_type(&absf) != FileType::Dir {
            bail!("{} not directory", absf);
        }
        if !cfg.force {
            // /path/to/dir is allowed, but /path/to is not
            let count = absf.matches('/').count();
            if count < 3 {
                bail!("{} not allowed, use --force option to proceed", absf);
            }
        }
        debug!("input[{}]: {}", i, absf);
        input.push(absf);
    }

    // and the directories should be writable
    if cfg.debug && cfg.num_writer > 0 {
        for f in &input {
            debug!("{} writable {}", f, is_dir_writable(f)?);
        }
    }

    // create flist and exit
    if cfg.flist_file_create {
        if cfg.flist_file.is_empty() {
            bail!("empty flist file path");
        }
        create_flist_file(&input, &cfg.flist_file, cfg.ignore_dot, cfg.force)?;
        println!("{}", cfg.flist_file);
        return Ok(());
    }
    // clean write paths and exit
    if cfg.clean_write_paths {
        let mut l = collect_write_paths(&input, &cfg)?;
        let a = l.len();
        unlink_write_paths(&mut l, -1)?;
        let b = l.len();
        debug_assert!(a >= b);
        println!("Unlinked {} / {} write paths", a - b, a);
        if b != 0 {
            println!("{} / {} write paths remaining", b, a);
            process::exit(1);
        }
        return Ok(());
    }

    ctrlc::set_handler(worker::set_interrupted)
        .with_context(|| "failed to set SIGINT handler")?;

    // ready to dispatch workers
    for i in 0..cfg.num_set {
        if cfg.num_set != 1 {
            println!("{}", "=".repeat(80));
            let s = format!("Set {}/{}", i + 1, cfg.num_set);
            println!("{}", s);
            debug!("{}", s);
        }

        let result = dispatch_worker(&input, &cfg)?;
        if result.num_interrupted > 0 {
            println!(
                "{} worker{} interrupted",
                result.num_interrupted,
                if result.num_interrupted > 1 { "s" } else { "" }
            );
        }
        if result.num_error > 0 {
            println!(
                "{} worker{} failed",
                result.num_error,
                if result.num_error > 1 { "s" } else { "" }
            );
        }
        if result.num_remain > 0 {
            println!(
                "{} write path{} remaining",
                result.num_remain,
                if result.num_remain > 1 { "s" } else { "" }
            );
        }
        print_stat(&result.stats);
        if result.num_interrupted > 0 {
            break;
        }
        if cfg.num_set != 1 && i != cfg.num_set - 1 {
            println!();
        }
    }

    Ok(())
}
