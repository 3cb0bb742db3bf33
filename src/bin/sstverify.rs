//! `sstverify` — verify the sstables of one table.
//!
//! Shell usage:
//!
//! ```text
//! sstverify [options] <keyspace> <table>
//! ```
//!
//! Exit code 0 when every sstable verified, 1 on any failure or
//! argument/setup error.

use std::process;

use tracing_subscriber::EnvFilter;

use liveset::verifier::{build_cli, options_from_matches, run};

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let matches = build_cli().get_matches();

    let options = match options_from_matches(&matches) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    process::exit(run(&options));
}
