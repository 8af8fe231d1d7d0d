// imports
use crate::config::CorpusConfig;
use crate::corpus::{read_corpus, Document};
use crate::error::Result;
use crate::preprocess::Preprocessor;

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fmt::Display;
use std::io::Write;

/// Preprocessed sentences of the corpus. Every call to `iter` is a new pass
/// over the archives, so the trainer can walk it once per epoch.
pub struct Sentences {
    corpus: CorpusConfig,
    prep: Preprocessor,
}

impl Sentences {

    pub fn new(corpus: CorpusConfig, prep: Preprocessor) -> Self {
        Sentences { corpus, prep }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Vec<String>>> + '_ {
        read_corpus(&self.corpus).flat_map(move |doc| {
            // a broken document surfaces as a single error item
            let sents: Vec<Result<Vec<String>>> = match doc {
                Ok(paras) => paras.into_iter().flatten().map(|sent| Ok(self.prep.prep_sent(&sent))).collect(),
                Err(e) => vec![Err(e)],
            };
            sents
        })
    }

}

pub fn doc_progress() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} doc [{elapsed_precise}, {per_sec}]") {
        bar.set_style(style);
    }
    bar
}


#[derive(Debug, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub num_articles: usize,
    pub num_tokens: usize,
    pub num_types: usize,
}

impl Display for CorpusStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# articles    : {}", self.num_articles)?;
        writeln!(f, "# word tokens : {}", self.num_tokens)?;
        write!(f, "# word types  : {}", self.num_types)
    }
}

/// Counts articles, preprocessed word tokens and distinct word types.
pub fn corpus_stats(corpus: &CorpusConfig, prep: &Preprocessor) -> Result<CorpusStats> {

    let mut stats = CorpusStats::default();
    let mut vocab: HashSet<String> = HashSet::new();
    let progress = doc_progress();

    for paras in read_corpus(corpus) {
        let paras = paras?;
        stats.num_articles += 1;
        for sent in paras.iter().flatten() {
            let sent = prep.prep_sent(sent);
            stats.num_tokens += sent.len();
            vocab.extend(sent);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    stats.num_types = vocab.len();
    Ok(stats)
}

/// One article per line, the way GloVe's tools expect their input.
pub fn glove_line(prep: &Preprocessor, paras: &Document) -> String {
    paras
        .iter()
        .flatten()
        .map(|sent| prep.prep_sent(sent).join(" "))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn write_glove_corpus<W: Write>(corpus: &CorpusConfig, prep: &Preprocessor, out: &mut W) -> Result<usize> {

    let progress = doc_progress();
    let mut n_docs = 0;
    for paras in read_corpus(corpus) {
        writeln!(out, "{}", glove_line(prep, &paras?))?;
        n_docs += 1;
        progress.inc(1);
    }
    out.flush()?;
    progress.finish_and_clear();
    Ok(n_docs)
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::{PrepConfig, Product};
    use crate::corpus::tests::{corpus_params, doc_line, write_gz, write_plain};

    fn setup(root: &std::path::Path) -> CorpusConfig {
        write_plain(&root.join("kt"), 2000, &[
            doc_line(&[&["Harga", "naik", "10", "persen", "."], &["Pasar", "sepi"]]),
        ]);
        write_gz(&root.join("kt"), 2001, &[doc_line(&[&["Harga", "turun", "!"]])]);
        write_plain(&root.join("mbm"), 2010, &[doc_line(&[&[",", "."]])]);
        corpus_params(root, Product::All)
    }

    #[test]
    fn sentences_are_preprocessed_and_restartable() {

        let root = tempfile::tempdir().unwrap();
        let params = setup(root.path());
        let sentences = Sentences::new(params, Preprocessor::new(&PrepConfig::default()).unwrap());

        let first: Vec<Vec<String>> = sentences.iter().map(|s| s.unwrap()).collect();
        assert_eq!(first, vec![
            vec!["harga", "naik", "@@NUM@@", "persen"],
            vec!["pasar", "sepi"],
            vec!["harga", "turun"],
            vec![],
        ]);

        let second: Vec<Vec<String>> = sentences.iter().map(|s| s.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn stats_count_articles_tokens_and_types() {

        let root = tempfile::tempdir().unwrap();
        let params = setup(root.path());
        let prep = Preprocessor::new(&PrepConfig::default()).unwrap();

        let stats = corpus_stats(&params, &prep).unwrap();
        assert_eq!(stats, CorpusStats { num_articles: 3, num_tokens: 8, num_types: 7 });
    }

    #[test]
    fn glove_corpus_has_one_line_per_article() {

        let root = tempfile::tempdir().unwrap();
        let params = setup(root.path());
        let prep = Preprocessor::new(&PrepConfig::default()).unwrap();

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(write_glove_corpus(&params, &prep, &mut out).unwrap(), 3);
        assert_eq!(String::from_utf8(out).unwrap(), "harga naik @@NUM@@ persen pasar sepi\nharga turun\n\n");
    }
}
