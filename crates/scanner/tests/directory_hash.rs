#![forbid(unsafe_code)]

use proptest::prelude::*;
use scanner::DirectoryHasher;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn touch(path: &Path, unix_secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(unix_secs))
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Identical file sets with identical mtimes always hash identically,
    /// and any mtime change to a matched file changes the hash.
    #[test]
    fn hash_depends_exactly_on_matched_names_and_mtimes(
        names in proptest::collection::btree_set("[a-z]{1,8}", 1..6),
        mtimes in proptest::collection::vec(1_600_000_000u64..1_700_000_000, 6),
        bump in 1u64..1_000_000,
    ) {
        let dir = tempdir().unwrap();
        let hasher = DirectoryHasher::new(vec!["phar".to_string()], false);

        let names: Vec<_> = names.into_iter().collect();
        for (name, mtime) in names.iter().zip(&mtimes) {
            let path = dir.path().join(format!("{name}.phar"));
            std::fs::write(&path, b"x").unwrap();
            touch(&path, *mtime);
        }

        let baseline = hasher.digest(dir.path()).unwrap();
        prop_assert_eq!(&baseline, &hasher.digest(dir.path()).unwrap());

        // Touching any single matched file perturbs the digest.
        let victim = dir.path().join(format!("{}.phar", names[0]));
        touch(&victim, mtimes[0] + bump);
        prop_assert_ne!(&baseline, &hasher.digest(dir.path()).unwrap());

        // Restoring the mtime restores the digest.
        touch(&victim, mtimes[0]);
        prop_assert_eq!(&baseline, &hasher.digest(dir.path()).unwrap());

        // Unmatched files are invisible to the digest.
        std::fs::write(dir.path().join("noise.txt"), b"y").unwrap();
        prop_assert_eq!(&baseline, &hasher.digest(dir.path()).unwrap());
    }
}
