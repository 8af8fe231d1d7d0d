use crate::config::files_handling::{read_input, read_lines, SaveFile};
use crate::config::Encoding;
use crate::error::{Result, WordvecError};

use ndarray::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Word vectors keyed by token, with a unit-length copy kept for cosine
/// similarity queries.
pub struct KeyedVectors {
    words: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Array2<f32>,
    normed: Array2<f32>,
}

impl KeyedVectors {

    pub fn new(words: Vec<String>, vectors: Array2<f32>) -> Result<KeyedVectors> {

        if words.len() != vectors.dim().0 {
            return Err(WordvecError::LengthMismatch { tokens: words.len(), vectors: vectors.dim().0 });
        }

        let mut index = HashMap::with_capacity(words.len());
        for (i, w) in words.iter().enumerate() {
            index.entry(w.to_owned()).or_insert(i);
        }

        // need to normalize so each row has l2 norm 1, zero rows stay zero
        let mut normed = vectors.clone();
        for mut row in normed.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        Ok(KeyedVectors { words, index, vectors, normed })
    }

    /// Reads the word2vec text format: a `count dim` header, then one
    /// `token v1 .. vdim` line per word. The last `dim` fields are the vector,
    /// whatever precedes them is the (possibly multi-word) token.
    pub fn load_word2vec_format(path: &Path, encoding: Encoding) -> Result<KeyedVectors> {

        info!("loading word vectors from {}", path.display());
        let mut lines = read_lines(path, encoding)?;

        let header = lines.next().transpose()?.unwrap_or_default();
        let (count, dim) = parse_header(&header).ok_or_else(|| WordvecError::VectorsFormat {
            line: 1,
            reason: format!("expected '<count> <dim>' header, found '{}'", header),
        })?;

        // sized by the lines actually read, not by the header
        let mut words: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut values: Vec<f32> = Vec::new();

        for i in 0..count {
            let linum = i + 2;
            let line = match lines.next() {
                Some(line) => line?,
                None => return Err(WordvecError::VectorsFormat {
                    line: linum,
                    reason: format!("unexpected end of file, header promised {} vectors", count),
                }),
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() <= dim {
                return Err(WordvecError::VectorsFormat {
                    line: linum,
                    reason: format!("expected a token and {} values, found {} fields", dim, fields.len()),
                });
            }

            let (token_fields, value_fields) = fields.split_at(fields.len() - dim);
            let token = token_fields.join(" ");
            if !seen.insert(token.to_owned()) {
                warn!("duplicate word '{}' at line {}, ignoring all but first", token, linum);
                continue;
            }
            for v in value_fields {
                let v: f32 = v.parse().map_err(|_| WordvecError::VectorsFormat {
                    line: linum,
                    reason: format!("cannot parse '{}' as a number", v),
                })?;
                values.push(v);
            }
            words.push(token);
        }

        let vectors = Array2::from_shape_vec((words.len(), dim), values)
            .map_err(|e| WordvecError::VectorsFormat { line: 1, reason: e.to_string() })?;
        info!("loaded {} vectors of dimension {}", words.len(), dim);
        KeyedVectors::new(words, vectors)
    }

    /// Pairs a token list (one per line) with the rows of a `.npy` matrix.
    pub fn from_npy(tokens_path: &Path, vectors_path: &Path, encoding: Encoding) -> Result<KeyedVectors> {
        let tokens: Vec<String> = read_input(tokens_path, encoding)?;
        let vectors: Array2<f32> = read_input(vectors_path, encoding)?;
        KeyedVectors::new(tokens, vectors)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim().1
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    pub fn get_vector(&self, word: &str) -> Result<ArrayView1<f32>> {
        match self.index.get(word) {
            Some(i) => Ok(self.vectors.row(*i)),
            None => Err(WordvecError::NotInVocabulary(word.to_string())),
        }
    }

    /// The `topn` words closest by cosine to the mean of the unit vectors of
    /// `positive` minus those of `negative`. Query words never come back.
    pub fn most_similar(&self, positive: &[&str], negative: &[&str], topn: usize) -> Result<Vec<(String, f32)>> {

        if positive.is_empty() && negative.is_empty() {
            return Err(WordvecError::Config("cannot compute similarity with no input".to_string()));
        }

        let mut mean: Array1<f32> = Array1::zeros(self.dim());
        let mut used: HashSet<usize> = HashSet::new();
        for (words, weight) in [(positive, 1.0f32), (negative, -1.0f32)] {
            for word in words {
                let i = *self.index.get(*word).ok_or_else(|| WordvecError::NotInVocabulary(word.to_string()))?;
                mean.scaled_add(weight, &self.normed.row(i));
                used.insert(i);
            }
        }
        let norm = mean.dot(&mean).sqrt();
        if norm > 0.0 {
            mean /= norm;
        }

        // multiply all vectors by the query vector, of size vocab
        let scores = self.normed.dot(&mean);
        let mut indexed_scores: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| !used.contains(i))
            .collect();

        // most similar first, ties by position in the file
        let by_score = |a: &(usize, f32), b: &(usize, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
        if topn == 0 {
            return Ok(Vec::new());
        }
        if topn < indexed_scores.len() {
            indexed_scores.select_nth_unstable_by(topn - 1, by_score);
            indexed_scores.truncate(topn);
        }
        indexed_scores.sort_by(by_score);

        Ok(indexed_scores.into_iter().map(|(i, s)| (self.words[i].to_owned(), s)).collect())
    }

    pub fn write_word2vec_format<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{} {}", self.len(), self.dim())?;
        for (word, row) in self.words.iter().zip(self.vectors.axis_iter(Axis(0))) {
            write!(out, "{}", word)?;
            for v in row {
                write!(out, " {}", v)?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

}

fn parse_header(header: &str) -> Option<(usize, usize)> {
    let mut parts = header.split_whitespace();
    let count = parts.next()?.parse().ok()?;
    let dim = parts.next()?.parse().ok()?;
    Some((count, dim))
}

impl SaveFile for KeyedVectors {
    fn save_file(&self, path: &Path) -> Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        self.write_word2vec_format(&mut f)
    }
}
