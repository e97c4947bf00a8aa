//! Print every observation in a directory of record files
//!
//! Usage: records_dump <dir-or-file> [--subdirs]
//!
//! With `--subdirs`, files one directory level down are included too, the
//! layout used when files from several agents are collected side by side.

use probestore::query::{iterate_record_file, TailPolicy};
use probestore::storage::all_record_files;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probestore=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(target) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: {} <dir-or-file> [--subdirs]", args[0]);
        std::process::exit(2);
    };
    let include_subdirs = args.iter().skip(2).any(|a| a == "--subdirs");

    let files = if target.is_file() {
        vec![target]
    } else {
        all_record_files(&target, include_subdirs)?
    };

    let mut total = 0usize;
    let mut failed = 0usize;
    for path in &files {
        // Collected files may be copies of a file still being written
        let result = iterate_record_file(path, TailPolicy::TolerateTruncated, |obs| {
            println!("{}", obs);
            total += 1;
            ControlFlow::Continue(())
        });
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "cannot read record file");
            failed += 1;
        }
    }

    eprintln!("{} observations in {} files ({} unreadable)", total, files.len(), failed);
    Ok(())
}
