//! Quote corpus for ambient speech.
//!
//! The corpus uses the classic `fortune` file layout: records separated by
//! lines that start with `%`. Line breaks inside a record collapse to spaces.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{ProbeError, Result};

/// Record separator marker.
pub const RECORD_DELIMITER: char = '%';

/// Directory searched for bare corpus names.
pub const DEFAULT_CORPUS_DIR: &str = "/usr/share/games/fortune";

/// Default corpus name.
pub const DEFAULT_CORPUS: &str = "zippy";

/// An ordered, immutable collection of things to say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteCorpus {
    records: Vec<String>,
}

impl QuoteCorpus {
    /// Parse corpus text.
    pub fn parse(text: &str) -> Self {
        let mut records = Vec::new();
        let mut current = String::new();

        for line in text.lines() {
            if line.starts_with(RECORD_DELIMITER) {
                push_record(&mut records, &mut current);
                continue;
            }
            current.push_str(line);
            current.push(' ');
        }
        push_record(&mut records, &mut current);

        Self { records }
    }

    /// Read and parse the corpus at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Corpus`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ProbeError::Corpus {
            path: path.display().to_string(),
            source,
        })?;
        let corpus = Self::parse(&text);
        tracing::debug!(path = %path.display(), records = corpus.len(), "quote corpus loaded");
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    /// Pick a record uniformly at random; `None` for an empty corpus.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.records.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.records.len());
        self.records.get(idx).map(String::as_str)
    }
}

fn push_record(records: &mut Vec<String>, current: &mut String) {
    let record = current.trim_end();
    if !record.is_empty() {
        records.push(record.to_string());
    }
    current.clear();
}

/// Resolve a corpus name the way `fortune` does: anything that looks like a
/// path is used as-is, bare names are looked up in `dir`.
pub fn resolve_corpus_path(name: &str, dir: &Path) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() || candidate.exists() {
        candidate.to_path_buf()
    } else {
        dir.join(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLE: &str = "Are we having fun yet?\n%\nYow!  Am I in\nCALIFORNIA?\n%\n%\nI want a VEGETARIAN BURRITO\nto go... with\nEXTRA MSG!!\n";

    #[test]
    fn parses_records_and_collapses_lines() {
        let corpus = QuoteCorpus::parse(SAMPLE);
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.records()[0], "Are we having fun yet?");
        assert_eq!(corpus.records()[1], "Yow!  Am I in CALIFORNIA?");
        assert_eq!(
            corpus.records()[2],
            "I want a VEGETARIAN BURRITO to go... with EXTRA MSG!!"
        );
    }

    #[test]
    fn empty_text_yields_empty_corpus() {
        let corpus = QuoteCorpus::parse("%\n%\n");
        assert!(corpus.is_empty());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(corpus.pick(&mut rng).is_none());
    }

    #[test]
    fn pick_is_uniform() {
        let corpus = QuoteCorpus::parse("a\n%\nb\n%\nc\n%\nd\n");
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut counts = [0usize; 4];
        let draws = 40_000;
        for _ in 0..draws {
            let pick = corpus.pick(&mut rng).unwrap();
            let idx = corpus.records().iter().position(|r| r == pick).unwrap();
            counts[idx] += 1;
        }
        for count in counts {
            let freq = count as f64 / draws as f64;
            assert!((freq - 0.25).abs() < 0.02, "frequency {freq} too far from 1/4");
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let err = QuoteCorpus::load(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ProbeError::Corpus { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zippy");
        std::fs::write(&path, SAMPLE).unwrap();
        let corpus = QuoteCorpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn bare_names_resolve_into_the_corpus_dir() {
        let dir = Path::new("/usr/share/games/fortune");
        assert_eq!(
            resolve_corpus_path("zippy-does-not-exist", dir),
            dir.join("zippy-does-not-exist")
        );
        assert_eq!(
            resolve_corpus_path("./local/quotes", dir),
            PathBuf::from("./local/quotes")
        );
    }
}
