//! Tokenizer for logs recorded with QNX `fsysinfo -l PERIOD`.
//!
//! `fsysinfo` prints one report every period as a fixed 24 line block of
//! column-aligned rows. Each block repeats the same categories (`DISK I/O`,
//! `CACHE`, ...) and metric rows, so a log is flattened into one token stream
//! and every metric row contributes its columns to a series keyed by
//! `"<CATEGORY>.<metric>"`.

use std::fs::File;
use std::io::Read;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Number of lines in one report instance.
pub const REPORT_LINES: usize = 24;

/// Categories and the keys they expose, in the order `fsysinfo` prints them.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "DISK I/O",
        &[
            "read",
            "r/a",
            "write",
            "io req",
            "direct",
            "bad",
            "read.bytes",
            "r/a.bytes",
            "write.bytes",
            "io req.bytes",
            "direct.bytes",
        ],
    ),
    (
        "CACHE",
        &["read", "write", "mfu", "mru", "ratio", "read.bytes", "write.bytes"],
    ),
    (
        "SYSCALL",
        &[
            "open",
            "create",
            "delete",
            "trunc",
            "stat",
            "namei",
            "modes",
            "owner",
            "rename",
            "devctl",
            "sync",
            "pause",
            "change",
            "timed",
            "write",
            "read",
            "write.bytes",
            "read.bytes",
        ],
    ),
    ("NAMES", &["exist", "enoent", "misses", "unsuit", "stale", "rate"]),
    ("BMAP", &["hit", "miss", "rate"]),
    ("VNODES", &["create", "hit", "rate", "lock", "recycl"]),
    ("SLAB", &["map", "unmap", "active"]),
    ("THREADS", &["create", "destro", "pool"]),
];

/// Row labels in report order. Duplicates are kept so lookups walk the same
/// sequence the report layout does.
const METRIC_VOCABULARY: &[&str] = &[
    "read", "r/a", "write", "io req", "direct", "bad", // DISK I/O
    "read", "write", "mfu", "mru", "ratio", // CACHE
    "open", "create", "delete", "trunc", "stat", "namei", "modes", "owner", "rename", "devctl",
    "sync", "pause", "change", "timed", "write", "read", // SYSCALL
    "exist", "enoent", "misses", "unsuit", "stale", "rate", // NAMES
    "hit", "miss", "rate", // BMAP
    "create", "hit", "rate", "lock", "recycl", // VNODES
    "map", "unmap", "active", // SLAB
    "create", "destro", "pool", // THREADS
];

/// Token that marks the byte-volume sub-row of the preceding metric.
const BYTES_TOKEN: &str = "bytes";

/// Errors that can occur while reading or tokenizing a log.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unable to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sample {token:?} for {key}")]
    InvalidSample {
        key: String,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

/// Metric series in first-seen key order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet<T = i64> {
    series: Vec<(String, Vec<T>)>,
}

impl<T> SampleSet<T> {
    pub fn new() -> Self {
        Self { series: Vec::new() }
    }

    /// Series recorded for `key`, if the log contained it.
    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.series
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.series.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Build a new set by rewriting every series, keeping key order.
    pub fn map_series<U, F>(&self, mut f: F) -> SampleSet<U>
    where
        F: FnMut(&[T]) -> Vec<U>,
    {
        SampleSet {
            series: self
                .series
                .iter()
                .map(|(k, v)| (k.clone(), f(v)))
                .collect(),
        }
    }

    /// Index of `key`, inserting an empty series the first time it is seen.
    fn ensure(&mut self, key: &str) -> usize {
        match self.series.iter().position(|(k, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.series.push((key.to_string(), Vec::new()));
                self.series.len() - 1
            }
        }
    }
}

impl<T> Default for SampleSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and tokenize a log file.
///
/// The file is read completely and closed before tokenizing starts.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<SampleSet, ParseError> {
    let path = path.as_ref();
    let text = {
        let mut file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|source| ParseError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        text
    };

    info!(path = %path.display(), lines = text.lines().count(), "opened log");
    tokenize(&text)
}

/// Tokenize the text of a log into a [`SampleSet`].
pub fn tokenize(text: &str) -> Result<SampleSet, ParseError> {
    let mut tokenizer = Tokenizer::default();
    for token in flatten(text) {
        tokenizer.feed(&token)?;
    }
    Ok(tokenizer.samples)
}

/// Collapse the column-aligned layout into a flat token stream.
///
/// Lines past the last complete report are dropped. Columns are separated by
/// runs of at least two spaces, so joining lines with a double space and
/// splitting on it again yields one token per cell.
fn flatten(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let complete = lines.len() - lines.len() % REPORT_LINES;
    if complete < lines.len() {
        debug!(
            dropped = lines.len() - complete,
            "discarding incomplete trailing report"
        );
    }

    lines[..complete]
        .join("  ")
        .split("  ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Classification of one flattened token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Category(&'a str),
    Metric(&'a str),
    Bytes,
    Value(&'a str),
}

impl<'a> Token<'a> {
    fn classify(token: &'a str) -> Self {
        if is_upper(token) {
            Token::Category(token)
        } else if metric_name(token).is_some() {
            Token::Metric(token)
        } else if token == BYTES_TOKEN {
            Token::Bytes
        } else {
            Token::Value(token)
        }
    }
}

/// At least one cased character and none of them lower-case.
fn is_upper(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// First vocabulary entry that contains `token`.
///
/// Matching is by containment, so short fragments such as `"re"` resolve to
/// the first row label they occur in.
pub fn metric_name(token: &str) -> Option<&'static str> {
    METRIC_VOCABULARY
        .iter()
        .copied()
        .find(|metric| metric.contains(token))
}

/// Parse one numeric cell, dropping a trailing `k` and then a trailing `%`.
pub fn parse_sample(token: &str) -> Result<i64, ParseIntError> {
    let token = token.strip_suffix('k').unwrap_or(token);
    let token = token.strip_suffix('%').unwrap_or(token);
    token.parse()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// No category header seen yet.
    #[default]
    Idle,
    /// Inside a category, waiting for a metric row.
    InCategory,
    /// Appending values to the series at this index.
    Appending(usize),
}

#[derive(Debug, Default)]
struct Tokenizer {
    state: State,
    category: String,
    key: String,
    samples: SampleSet,
}

impl Tokenizer {
    fn feed(&mut self, token: &str) -> Result<(), ParseError> {
        match Token::classify(token) {
            Token::Category(name) => {
                self.category = name.to_string();
                self.state = State::InCategory;
            }
            Token::Metric(name) => {
                self.key = format!("{}.{}", self.category, name);
                self.state = State::Appending(self.samples.ensure(&self.key));
            }
            Token::Bytes => {
                // The key is kept across headers, so a stray `bytes` still
                // extends the last metric seen.
                self.key.push_str(".bytes");
                self.state = State::Appending(self.samples.ensure(&self.key));
            }
            Token::Value(raw) => {
                if let State::Appending(idx) = self.state {
                    let value = parse_sample(raw).map_err(|source| ParseError::InvalidSample {
                        key: self.key.clone(),
                        token: raw.to_string(),
                        source,
                    })?;
                    self.samples.series[idx].1.push(value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Pad `rows` with empty lines to one full report.
    fn report(rows: &[&str]) -> String {
        assert!(rows.len() <= REPORT_LINES);
        let mut text = String::new();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        for _ in rows.len()..REPORT_LINES {
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_syscall_open_row() {
        let log = report(&["SYSCALL", "  open      10      20      30"]);
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("SYSCALL.open"), Some(&[10, 20, 30][..]));
    }

    #[test]
    fn test_suffixes_are_stripped() {
        assert_eq!(parse_sample("5k").unwrap(), 5);
        assert_eq!(parse_sample("42%").unwrap(), 42);
        assert_eq!(parse_sample("7").unwrap(), 7);
        assert_eq!(parse_sample("-3").unwrap(), -3);
        assert!(parse_sample("k").is_err());
        assert!(parse_sample("12x").is_err());
    }

    #[test]
    fn test_bytes_sub_row() {
        let log = report(&[
            "DISK I/O",
            "  read      4       8",
            "  bytes     4k      8k",
            "  write     1       2",
        ]);
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("DISK I/O.read"), Some(&[4, 8][..]));
        assert_eq!(samples.get("DISK I/O.read.bytes"), Some(&[4, 8][..]));
        assert_eq!(samples.get("DISK I/O.write"), Some(&[1, 2][..]));
        let keys: Vec<&str> = samples.keys().collect();
        assert_eq!(keys, ["DISK I/O.read", "DISK I/O.read.bytes", "DISK I/O.write"]);
    }

    #[test]
    fn test_categories_separate_keys() {
        let log = report(&[
            "CACHE",
            "  read      1       2",
            "  ratio     50%     75%",
            "SYSCALL",
            "  read      3       4",
        ]);
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("CACHE.read"), Some(&[1, 2][..]));
        assert_eq!(samples.get("CACHE.ratio"), Some(&[50, 75][..]));
        assert_eq!(samples.get("SYSCALL.read"), Some(&[3, 4][..]));
        assert_eq!(samples.get("NAMES.rate"), None);
    }

    #[test]
    fn test_reports_accumulate_in_order() {
        let mut log = report(&["BMAP", "  hit       1", "  miss      9"]);
        log.push_str(&report(&["BMAP", "  hit       2", "  miss      8"]));
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("BMAP.hit"), Some(&[1, 2][..]));
        assert_eq!(samples.get("BMAP.miss"), Some(&[9, 8][..]));
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_incomplete_trailing_report_is_dropped() {
        let mut log = report(&["BMAP", "  hit       1"]);
        log.push_str("BMAP\n  hit       2\n");
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("BMAP.hit"), Some(&[1][..]));
    }

    #[test]
    fn test_short_log_is_empty() {
        let samples = tokenize("SYSCALL\n  open      10\n").unwrap();
        assert!(samples.is_empty());
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_values_after_header_are_ignored() {
        let log = report(&["THREADS  12  13", "  pool      3"]);
        let samples = tokenize(&log).unwrap();
        assert_eq!(samples.get("THREADS.pool"), Some(&[3][..]));
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_malformed_sample_is_fatal() {
        let log = report(&["SLAB", "  map       1       two"]);
        let err = tokenize(&log).unwrap_err();
        match err {
            ParseError::InvalidSample { key, token, .. } => {
                assert_eq!(key, "SLAB.map");
                assert_eq!(token, "two");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metric_name_uses_containment() {
        assert_eq!(metric_name("rename"), Some("rename"));
        assert_eq!(metric_name("io req"), Some("io req"));
        assert_eq!(metric_name("re"), Some("read"));
        assert_eq!(metric_name("bytes"), None);
        assert_eq!(metric_name("10"), None);
    }

    #[test]
    fn test_upper_case_detection() {
        assert!(is_upper("DISK I/O"));
        assert!(is_upper("SYSCALL"));
        assert!(!is_upper("io req"));
        assert!(!is_upper("123"));
        assert!(!is_upper("Total"));
    }

    #[test]
    fn test_series_lengths_match_within_category() {
        let mut log = String::new();
        for i in 0..3 {
            log.push_str(&report(&[
                "VNODES",
                format!("  create    {i}").as_str(),
                format!("  hit       {}", i * 2).as_str(),
                format!("  lock      {}", i * 3).as_str(),
            ]));
        }
        let samples = tokenize(&log).unwrap();
        for key in ["VNODES.create", "VNODES.hit", "VNODES.lock"] {
            assert_eq!(samples.get(key).unwrap().len(), 3);
        }
    }

    #[test]
    fn test_parse_file_reads_log() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(report(&["NAMES", "  exist     5k      6k"]).as_bytes())
            .unwrap();
        let samples = parse_file(file.path()).unwrap();
        assert_eq!(samples.get("NAMES.exist"), Some(&[5, 6][..]));
    }

    #[test]
    fn test_parse_file_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_file(dir.path().join("missing.log")).unwrap_err();
        assert!(matches!(err, ParseError::Open { .. }));
    }

    #[test]
    fn test_map_series_keeps_order() {
        let log = report(&["SLAB", "  map  1  2", "  unmap  3  4"]);
        let samples = tokenize(&log).unwrap();
        let lengths = samples.map_series(|s| vec![s.len()]);
        let collected: Vec<(&str, &[usize])> = lengths.iter().collect();
        assert_eq!(collected, [("SLAB.map", &[2][..]), ("SLAB.unmap", &[2][..])]);
    }
}
