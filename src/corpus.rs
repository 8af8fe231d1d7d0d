// imports
use crate::config::files_handling::{read_lines, DecodedLines};
use crate::config::{CorpusConfig, Encoding, Product};
use crate::error::{Result, WordvecError};

use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::info;

pub type Sentence = Vec<String>;
pub type Paragraph = Vec<Sentence>;

/// One news article as stored in the yearly archives.
pub type Document = Vec<Paragraph>;

#[derive(Deserialize)]
struct Record {
    paragraphs: Document,
}

/// Lazily reads the documents of a list of yearly `jsonl` archives, opening a
/// single file at a time.
pub struct CorpusReader {
    pending: VecDeque<(PathBuf, u32)>,
    current: Option<(PathBuf, usize, DecodedLines)>,
    encoding: Encoding,
}

impl CorpusReader {

    fn new(encoding: Encoding) -> Self {
        CorpusReader { pending: VecDeque::new(), current: None, encoding }
    }

    fn add_years(&mut self, corpus_dir: &Path, begin_year: u32, end_year: u32) {
        info!("reading corpus from {} year {}-{}", corpus_dir.display(), begin_year, end_year);
        for year in begin_year..=end_year {
            self.pending.push_back((corpus_dir.to_path_buf(), year));
        }
    }

    fn open_next(&mut self) -> Option<Result<()>> {
        let (corpus_dir, year) = self.pending.pop_front()?;
        let path = year_file(&corpus_dir, year);
        match read_lines(&path, self.encoding) {
            Ok(lines) => {
                self.current = Some((path, 0, lines));
                Some(Ok(()))
            }
            Err(source) => Some(Err(WordvecError::Corpus { path, source })),
        }
    }
}

impl Iterator for CorpusReader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {

        loop {
            if let Some((path, linum, lines)) = self.current.as_mut() {
                match lines.next() {
                    Some(Ok(line)) => {
                        *linum += 1;
                        let record = serde_json::from_str::<Record>(line.trim()).map_err(|source| {
                            WordvecError::CorpusRecord { path: path.clone(), line: *linum, source }
                        });
                        return Some(record.map(|r| r.paragraphs));
                    }
                    Some(Err(source)) => {
                        let path = path.clone();
                        self.current = None;
                        self.pending.clear();
                        return Some(Err(WordvecError::Corpus { path, source }));
                    }
                    None => self.current = None,
                }
            }

            // current file exhausted, move on to the next year
            if let Err(e) = self.open_next()? {
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

/// The plain archive of a year wins over its gzipped twin.
pub fn year_file(corpus_dir: &Path, year: u32) -> PathBuf {
    let plain = corpus_dir.join(format!("{}.jsonl", year));
    if plain.exists() {
        plain
    } else {
        corpus_dir.join(format!("{}.jsonl.gz", year))
    }
}

/// Streams the documents selected by the corpus parameters; `all` yields the
/// whole kt corpus before the mbm one. Every call starts a new pass.
pub fn read_corpus(params: &CorpusConfig) -> CorpusReader {

    let mut reader = CorpusReader::new(params.encoding);
    match params.product {
        Product::Kt => reader.add_years(&params.path.join("kt"), params.kt_begin, params.kt_end),
        Product::Mbm => reader.add_years(&params.path.join("mbm"), params.mbm_begin, params.mbm_end),
        Product::All => {
            reader.add_years(&params.path.join("kt"), params.kt_begin, params.kt_end);
            reader.add_years(&params.path.join("mbm"), params.mbm_begin, params.mbm_end);
        }
    }
    reader
}


#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::{self, File};
    use std::io::Write;

    pub(crate) fn doc_line(words: &[&[&str]]) -> String {
        // a single paragraph with the given sentences
        let paragraphs = vec![words.iter().map(|s| s.iter().map(|w| w.to_string()).collect::<Vec<_>>()).collect::<Vec<_>>()];
        serde_json::json!({ "title": "x", "paragraphs": paragraphs }).to_string()
    }

    pub(crate) fn write_plain(dir: &Path, year: u32, lines: &[String]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{}.jsonl", year)), lines.join("\n") + "\n").unwrap();
    }

    pub(crate) fn write_gz(dir: &Path, year: u32, lines: &[String]) {
        fs::create_dir_all(dir).unwrap();
        let f = File::create(dir.join(format!("{}.jsonl.gz", year))).unwrap();
        let mut enc = GzEncoder::new(f, Compression::default());
        enc.write_all((lines.join("\n") + "\n").as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    pub(crate) fn corpus_params(root: &Path, product: Product) -> CorpusConfig {
        CorpusConfig {
            path: root.to_path_buf(),
            product,
            kt_begin: 2000,
            kt_end: 2001,
            mbm_begin: 2010,
            mbm_end: 2010,
            encoding: Encoding::Utf8,
        }
    }

    #[test]
    fn reads_kt_then_mbm_mixing_plain_and_gzip() {

        let root = tempfile::tempdir().unwrap();
        write_plain(&root.path().join("kt"), 2000, &[doc_line(&[&["Satu"]]), doc_line(&[&["Dua"]])]);
        write_gz(&root.path().join("kt"), 2001, &[doc_line(&[&["Tiga"]])]);
        write_gz(&root.path().join("mbm"), 2010, &[doc_line(&[&["Empat"]])]);

        let params = corpus_params(root.path(), Product::All);
        let firsts: Vec<String> = read_corpus(&params)
            .map(|doc| doc.unwrap()[0][0][0].clone())
            .collect();
        assert_eq!(firsts, vec!["Satu", "Dua", "Tiga", "Empat"]);

        // a second call is a new pass over the same files
        assert_eq!(read_corpus(&params).count(), 4);
    }

    #[test]
    fn plain_file_is_preferred_over_gzip() {

        let root = tempfile::tempdir().unwrap();
        let kt = root.path().join("kt");
        write_plain(&kt, 2000, &[doc_line(&[&["plain"]])]);
        write_gz(&kt, 2000, &[doc_line(&[&["zipped"]])]);
        write_plain(&kt, 2001, &[]);

        let mut params = corpus_params(root.path(), Product::Kt);
        params.kt_end = 2000;
        let docs: Vec<Document> = read_corpus(&params).map(|d| d.unwrap()).collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0][0][0], vec!["plain"]);
    }

    #[test]
    fn missing_year_is_fatal() {

        let root = tempfile::tempdir().unwrap();
        write_plain(&root.path().join("mbm"), 2010, &[doc_line(&[&["ada"]])]);

        let params = corpus_params(root.path(), Product::Kt);
        let mut reader = read_corpus(&params);
        match reader.next() {
            Some(Err(WordvecError::Corpus { path, source })) => {
                assert!(path.ends_with("kt/2000.jsonl.gz"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("expected a missing file error"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn record_without_paragraphs_is_fatal() {

        let root = tempfile::tempdir().unwrap();
        write_plain(&root.path().join("mbm"), 2010, &[r#"{"title": "no body"}"#.to_string()]);

        let params = corpus_params(root.path(), Product::Mbm);
        assert!(matches!(read_corpus(&params).next(), Some(Err(WordvecError::CorpusRecord { line: 1, .. }))));
    }
}
