use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::canonical::CanonicalRow;

/// Separator fed between `column=value` pairs.
const PAIR_SEPARATOR: &[u8] = b"\x1f";

/// Digest function used for row fingerprints.
///
/// The purpose is change detection, not tamper resistance, so the default
/// favours speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
    Blake3,
}

/// Fixed 16-byte row fingerprint. Longer digests are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowDigest(pub [u8; 16]);

impl RowDigest {
    fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes[..16]);
        RowDigest(out)
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for RowDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for RowDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

enum State {
    Md5(Md5),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl State {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => State::Md5(Md5::new()),
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => State::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            State::Md5(h) => h.update(bytes),
            State::Sha256(h) => h.update(bytes),
            State::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finish(self) -> RowDigest {
        match self {
            State::Md5(h) => RowDigest::from_slice(&h.finalize()),
            State::Sha256(h) => RowDigest::from_slice(&h.finalize()),
            State::Blake3(h) => RowDigest::from_slice(h.finalize().as_bytes()),
        }
    }
}

/// Computes row digests.
///
/// Input is the canonical `column=value` pairs in column-name order joined by
/// `0x1f`, so the digest does not depend on the column order of either
/// database, and ignored columns (absent from the canonical row) cannot
/// influence it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowHasher {
    algorithm: HashAlgorithm,
}

impl RowHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self, row: &CanonicalRow) -> RowDigest {
        let mut state = State::new(self.algorithm);
        for (i, (col, value)) in row.pairs().enumerate() {
            if i > 0 {
                state.update(PAIR_SEPARATOR);
            }
            state.update(col.as_bytes());
            state.update(b"=");
            state.update(value.as_bytes());
        }
        state.finish()
    }
}

/// Order-independent checksum of a whole table: row count plus the wrapping
/// sum of row digests. Two sides holding the same multiset of rows agree
/// regardless of the order the database returned them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableChecksum {
    pub rows: u64,
    sum: u128,
}

impl TableChecksum {
    pub fn add(&mut self, digest: &RowDigest) {
        self.rows += 1;
        self.sum = self.sum.wrapping_add(digest.as_u128());
    }

    pub fn hex(&self) -> String {
        format!("{:032x}", self.sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical::{NormalizationRules, RowCodec};
    use crate::domain::cell::{Cell, RawRow};
    use crate::domain::table_spec::{KeyKind, TableSpec};
    use crate::domain::value_objects::{ColumnName, IgnoredColumns, TableName};

    fn spec(ignored: &[&str]) -> TableSpec {
        TableSpec::new(
            TableName("t".into()),
            TableName("t".into()),
            ["id", "name", "etl_loaded_at", "batch_id"]
                .iter()
                .map(|c| ColumnName::from(*c))
                .collect(),
            vec![ColumnName::from("id")],
            KeyKind::PrimaryKey,
            IgnoredColumns(ignored.iter().map(|c| c.to_string()).collect()),
        )
        .unwrap()
    }

    fn raw(id: i64, name: &str, loaded: &str, batch: i64) -> RawRow {
        [
            ("id".to_string(), Cell::Int(id)),
            ("name".to_string(), Cell::text(name)),
            ("etl_loaded_at".to_string(), Cell::text(loaded)),
            ("batch_id".to_string(), Cell::Int(batch)),
        ]
        .into()
    }

    #[test]
    fn rows_differing_only_in_ignored_columns_hash_equal() {
        let spec = spec(&["etl_loaded_at", "batch_id"]);
        let rules = NormalizationRules::default();
        let codec = RowCodec::new(&spec, &rules);
        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            let hasher = RowHasher::new(algorithm);
            let a = hasher.digest(&codec.canonicalize(&raw(1, "a", "2024-01-01", 7)).unwrap());
            let b = hasher.digest(&codec.canonicalize(&raw(1, "a", "2025-06-30", 99)).unwrap());
            assert_eq!(a, b, "{algorithm:?}");
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let spec = spec(&[]);
        let rules = NormalizationRules::default();
        let codec = RowCodec::new(&spec, &rules);
        let hasher = RowHasher::default();
        let row = raw(5, "x", "t", 1);
        let first = hasher.digest(&codec.canonicalize(&row).unwrap());
        let second = hasher.digest(&codec.canonicalize(&row).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn content_change_changes_digest() {
        let spec = spec(&["etl_loaded_at", "batch_id"]);
        let rules = NormalizationRules::default();
        let codec = RowCodec::new(&spec, &rules);
        let hasher = RowHasher::default();
        let a = hasher.digest(&codec.canonicalize(&raw(1, "a", "t", 1)).unwrap());
        let b = hasher.digest(&codec.canonicalize(&raw(1, "b", "t", 1)).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn md5_of_known_input() {
        let spec = TableSpec::new(
            TableName("t".into()),
            TableName("t".into()),
            vec![ColumnName::from("a")],
            vec![ColumnName::from("a")],
            KeyKind::PrimaryKey,
            IgnoredColumns::default(),
        )
        .unwrap();
        let rules = NormalizationRules::default();
        let row = RowCodec::new(&spec, &rules)
            .canonicalize(&[("a".to_string(), Cell::text("1"))].into())
            .unwrap();
        // md5("a=1")
        assert_eq!(
            RowHasher::default().digest(&row).to_string(),
            "3872c9ae3f427af0be0ead09d07ae2cf"
        );
    }

    #[test]
    fn table_checksum_ignores_row_order() {
        let d1 = RowDigest([1; 16]);
        let d2 = RowDigest([2; 16]);
        let mut a = TableChecksum::default();
        a.add(&d1);
        a.add(&d2);
        let mut b = TableChecksum::default();
        b.add(&d2);
        b.add(&d1);
        assert_eq!(a, b);
        assert_eq!(a.rows, 2);
    }
}
