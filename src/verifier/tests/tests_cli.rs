//! Verifier CLI grammar and structural-check tests.
//!
//! Coverage:
//! - full flag matrix parses (long and short forms, repeated `-t`)
//! - token-range parsing errors are setup errors
//! - verification outcomes: clean table → exit 0; missing data
//!   component → exit 1; stale format under `--check_version` → exit 1
//! - `--quick` skips the data read (a data-less sstable still fails,
//!   but an empty data file passes)
//! - obsoletion logs and stray files are not treated as sstables

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use crate::descriptor::{Component, Descriptor, FormatTag};
    use crate::ranges::{Token, TokenRange};
    use crate::verifier::{
        VerifierError, VerifyOptions, build_cli, options_from_matches, parse_token_range, run,
        verify_table,
    };

    fn options(temp: &TempDir, keyspace: &str, table: &str) -> VerifyOptions {
        VerifyOptions {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            data_dir: temp.path().to_path_buf(),
            verbose: false,
            extended: false,
            debug: false,
            check_version: false,
            mutate_repair_status: false,
            quick: false,
            token_ranges: Vec::new(),
        }
    }

    fn table_dir(temp: &TempDir) -> PathBuf {
        let dir = temp.path().join("ks1").join("events-1");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    // ----------------------------------------------------------------
    // Argument grammar
    // ----------------------------------------------------------------

    /// # Scenario
    /// The documented flag matrix parses, long and short forms alike,
    /// with `-t` repeatable.
    #[test]
    fn parses_full_flag_matrix() {
        let matches = build_cli()
            .try_get_matches_from([
                "sstverify",
                "-v",
                "--extended",
                "--debug",
                "-c",
                "-r",
                "-q",
                "-t",
                "0,100",
                "--token_range",
                "200,300",
                "ks1",
                "events",
            ])
            .unwrap();

        let options = options_from_matches(&matches).unwrap();

        assert_eq!(options.keyspace, "ks1");
        assert_eq!(options.table, "events");
        assert!(options.verbose);
        assert!(options.extended);
        assert!(options.debug);
        assert!(options.check_version);
        assert!(options.mutate_repair_status);
        assert!(options.quick);
        assert_eq!(
            options.token_ranges,
            vec![
                TokenRange::new(Token(0), Token(100)),
                TokenRange::new(Token(200), Token(300)),
            ]
        );
    }

    /// # Scenario
    /// Missing positionals and malformed token ranges are argument
    /// errors.
    #[test]
    fn rejects_bad_arguments() {
        assert!(build_cli().try_get_matches_from(["sstverify", "ks1"]).is_err());

        assert!(matches!(
            parse_token_range("12"),
            Err(VerifierError::BadTokenRange(_))
        ));
        assert!(matches!(
            parse_token_range("a,b"),
            Err(VerifierError::BadTokenRange(_))
        ));
        assert!(parse_token_range(" -5 , 10 ").is_ok());
    }

    // ----------------------------------------------------------------
    // Outcomes and exit codes
    // ----------------------------------------------------------------

    /// # Scenario
    /// A table with readable sstables verifies cleanly; exit code 0.
    #[test]
    fn clean_table_exits_zero() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        for generation in [1u64, 2] {
            let d = Descriptor::new(&dir, "ks1", "events", generation, FormatTag::Bti);
            fs::write(d.path_for(Component::Data), b"payload").unwrap();
            fs::write(d.path_for(Component::Statistics), b"stats").unwrap();
        }

        let opts = options(&temp, "ks1", "events");
        let outcomes = verify_table(&opts).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.failure.is_none()));
        assert_eq!(run(&opts), 0);
    }

    /// # Scenario
    /// An sstable whose data component vanished fails; exit code 1.
    #[test]
    fn missing_data_component_fails() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let d = Descriptor::new(&dir, "ks1", "events", 1, FormatTag::Big);
        // Only a non-data component exists.
        fs::write(d.path_for(Component::PrimaryIndex), b"index").unwrap();

        let opts = options(&temp, "ks1", "events");
        let outcomes = verify_table(&opts).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(
            outcomes[0]
                .failure
                .as_deref()
                .unwrap()
                .contains("missing data")
        );
        assert_eq!(run(&opts), 1);
    }

    /// # Scenario
    /// `--check_version` fails sstables not on the latest format.
    #[test]
    fn check_version_requires_latest_format() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let stale = Descriptor::new(&dir, "ks1", "events", 1, FormatTag::Big);
        fs::write(stale.path_for(Component::Data), b"x").unwrap();

        let mut opts = options(&temp, "ks1", "events");
        assert_eq!(run(&opts), 0, "version not enforced by default");

        opts.check_version = true;
        assert_eq!(run(&opts), 1);
    }

    /// # Scenario
    /// Setup errors (unknown table) exit 1.
    #[test]
    fn unknown_table_is_setup_error() {
        let temp = TempDir::new().unwrap();
        table_dir(&temp);

        let opts = options(&temp, "ks1", "nope");
        assert!(matches!(
            verify_table(&opts),
            Err(VerifierError::MissingTable { .. })
        ));
        assert_eq!(run(&opts), 1);
    }

    /// # Scenario
    /// `--mutate_repair_status` marks exactly the clean sstables as
    /// repaired; a failing sstable and flag-less runs mark nothing.
    ///
    /// # Starting environment
    /// One readable sstable and one whose data component is missing.
    ///
    /// # Actions
    /// 1. `verify_table` without the flag.
    /// 2. `verify_table` with the flag.
    ///
    /// # Expected behavior
    /// First run marks nothing; second run marks only the clean
    /// sstable.
    #[test]
    fn mutate_repair_status_marks_only_verified() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);

        let clean = Descriptor::new(&dir, "ks1", "events", 1, FormatTag::Big);
        fs::write(clean.path_for(Component::Data), b"payload").unwrap();
        let broken = Descriptor::new(&dir, "ks1", "events", 2, FormatTag::Big);
        fs::write(broken.path_for(Component::PrimaryIndex), b"index").unwrap();

        let mut opts = options(&temp, "ks1", "events");
        let outcomes = verify_table(&opts).unwrap();
        assert!(outcomes.iter().all(|o| !o.marked_repaired));

        opts.mutate_repair_status = true;
        let outcomes = verify_table(&opts).unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            if outcome.descriptor == clean {
                assert!(outcome.failure.is_none());
                assert!(outcome.marked_repaired);
            } else {
                assert!(outcome.failure.is_some());
                assert!(!outcome.marked_repaired);
            }
        }
    }

    /// # Scenario
    /// Stray files — obsoletion logs, temp files — are not sstables
    /// and do not affect the verdict.
    #[test]
    fn strays_are_ignored() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let d = Descriptor::new(&dir, "ks1", "events", 1, FormatTag::Big);
        fs::write(d.path_for(Component::Data), b"x").unwrap();
        fs::write(
            dir.join("compaction-00000000-0000-4000-8000-000000000000.oblog"),
            b"ADD whatever deadbeef\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), b"hello").unwrap();

        let opts = options(&temp, "ks1", "events");
        let outcomes = verify_table(&opts).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(run(&opts), 0);
    }
}
