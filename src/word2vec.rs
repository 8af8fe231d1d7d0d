// imports
use crate::config::files_handling::{save_output, SaveFile};
use crate::config::Word2vecConfig;
use crate::error::{Result, WordvecError};
use crate::sentences::Sentences;
use crate::vectors::KeyedVectors;

use ndarray::prelude::*;
use ndarray::Array;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

const CHUNK_SENTENCES: usize = 10_000;
const MAX_EXP: f32 = 6.0;

/// Anything that can be walked once per epoch, yielding tokenized sentences.
pub trait SentenceSource {
    fn pass(&self) -> Box<dyn Iterator<Item = Result<Vec<String>>> + '_>;
}

impl SentenceSource for Sentences {
    fn pass(&self) -> Box<dyn Iterator<Item = Result<Vec<String>>> + '_> {
        Box::new(self.iter())
    }
}

impl SentenceSource for Vec<Vec<String>> {
    fn pass(&self) -> Box<dyn Iterator<Item = Result<Vec<String>>> + '_> {
        Box::new(self.iter().map(|s| Ok(s.clone())))
    }
}


/// A trained word2vec (or fastText) model. Word vectors are the input
/// weights; with fastText every word also owns hashed character n-grams and its
/// vector is the mean of the word and n-gram rows.
#[derive(Serialize, Deserialize)]
pub struct Word2VecModel {
    params: Word2vecConfig,
    words: Vec<String>,
    counts: Vec<u64>,
    index: HashMap<String, usize>,
    syn0: Array2<f32>,
    syn1neg: Array2<f32>,
    ngrams: Option<Array2<f32>>,
    subwords: Vec<Vec<usize>>,
}

impl Word2VecModel {

    /// Scans the sentences once and keeps the words seen at least `min_count`
    /// times, most frequent first.
    fn build_vocab<S: SentenceSource + ?Sized>(sentences: &S, params: &Word2vecConfig) -> Result<(Vec<String>, Vec<u64>)> {

        let mut token2count: HashMap<String, u64> = HashMap::new();
        let mut raw_words: u64 = 0;
        for sent in sentences.pass() {
            for tok in sent? {
                raw_words += 1;
                *token2count.entry(tok).or_insert(0) += 1;
            }
        }

        let n_types = token2count.len();
        let mut tup: Vec<(String, u64)> = token2count
            .into_iter()
            .filter(|(_, c)| *c >= params.min_count as u64)
            .collect();
        tup.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        info!("collected {} word types from a corpus of {} raw words, keeping {} with min_count={}",
            n_types, raw_words, tup.len(), params.min_count);
        if tup.is_empty() {
            return Err(WordvecError::EmptyVocabulary { min_count: params.min_count });
        }
        Ok(tup.into_iter().unzip())
    }

    fn new(words: Vec<String>, counts: Vec<u64>, params: &Word2vecConfig, rng: &mut StdRng) -> Word2VecModel {

        let vocab_size = words.len();
        let dim = params.size;
        let init = Uniform::new(-0.5 / dim as f32, 0.5 / dim as f32);

        let index: HashMap<String, usize> = words.iter().enumerate().map(|(i, w)| (w.to_owned(), i)).collect();
        let (ngrams, subwords) = if params.use_fasttext {
            let subwords = words.iter().map(|w| subword_buckets(w, params.min_n, params.max_n, params.bucket)).collect();
            (Some(Array::random_using((params.bucket, dim), init, rng)), subwords)
        } else {
            (None, Vec::new())
        };

        Word2VecModel {
            params: params.clone(),
            words,
            counts,
            index,
            syn0: Array::random_using((vocab_size, dim), init, rng),
            syn1neg: Array2::zeros((vocab_size, dim)),
            ngrams,
            subwords,
        }
    }

    pub fn params(&self) -> &Word2vecConfig {
        &self.params
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn count(&self, word: &str) -> Option<u64> {
        self.index.get(word).map(|i| self.counts[*i])
    }

    /// Input representation of an in-vocabulary word.
    fn input_vector(&self, word: usize) -> Array1<f32> {
        let mut v = self.syn0.row(word).to_owned();
        if let Some(ngrams) = &self.ngrams {
            let buckets = &self.subwords[word];
            for b in buckets {
                v += &ngrams.row(*b);
            }
            v /= (1 + buckets.len()) as f32;
        }
        v
    }

    fn apply_input_error(&mut self, word: usize, neu1e: &Array1<f32>) {
        self.syn0.row_mut(word).scaled_add(1.0, neu1e);
        if let Some(ngrams) = self.ngrams.as_mut() {
            for b in &self.subwords[word] {
                ngrams.row_mut(*b).scaled_add(1.0, neu1e);
            }
        }
    }

    /// Vector of a word; fastText models also answer for unseen words that
    /// share n-grams with the training vocabulary.
    pub fn vector(&self, word: &str) -> Option<Array1<f32>> {
        if let Some(i) = self.index.get(word) {
            return Some(self.input_vector(*i));
        }
        let ngrams = self.ngrams.as_ref()?;
        let buckets = subword_buckets(word, self.params.min_n, self.params.max_n, self.params.bucket);
        if buckets.is_empty() {
            return None;
        }
        let mut v: Array1<f32> = Array1::zeros(self.params.size);
        for b in &buckets {
            v += &ngrams.row(*b);
        }
        v /= buckets.len() as f32;
        Some(v)
    }

    pub fn word_vectors(&self) -> Result<KeyedVectors> {
        let mut w = Array2::zeros(self.syn0.dim());
        for i in 0..self.words.len() {
            w.row_mut(i).assign(&self.input_vector(i));
        }
        KeyedVectors::new(self.words.clone(), w)
    }

    pub fn load(path: &Path) -> Result<Word2VecModel> {
        let f = BufReader::new(File::open(path)?);
        let model = bincode::deserialize_from(f)?;
        Ok(model)
    }

}

impl SaveFile for Word2VecModel {
    fn save_file(&self, path: &Path) -> Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut f, self)?;
        Ok(())
    }
}


/// Training state that is not part of the model.
struct Sgd {
    rng: StdRng,
    noise: WeightedIndex<f64>,
    keep_probs: Vec<f32>,
    pool: ThreadPool,
    words_done: u64,
    words_total: u64,
}

impl Sgd {

    fn new(model: &Word2VecModel, rng: StdRng) -> Result<Sgd> {

        let params = &model.params;
        let retained: u64 = model.counts.iter().sum();

        // negatives are drawn from the unigram distribution raised to 3/4
        let noise = WeightedIndex::new(model.counts.iter().map(|c| (*c as f64).powf(0.75)))
            .map_err(|e| WordvecError::Config(format!("cannot build noise distribution: {}", e)))?;

        // frequent words are randomly skipped, rarer ones always kept
        let keep_probs = model.counts.iter().map(|c| {
            if params.sample <= 0.0 {
                return 1.0;
            }
            let threshold = params.sample * retained as f64;
            let c = *c as f64;
            (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0) as f32
        }).collect();

        let pool = ThreadPoolBuilder::new().num_threads(params.workers).build()?;

        Ok(Sgd {
            rng,
            noise,
            keep_probs,
            pool,
            words_done: 0,
            words_total: retained * params.epochs as u64,
        })
    }

    fn learning_rate(&self, params: &Word2vecConfig) -> f32 {
        let progress = if self.words_total == 0 { 0.0 } else { self.words_done as f32 / self.words_total as f32 };
        (params.alpha - (params.alpha - params.min_alpha) * progress).max(params.min_alpha)
    }

    /// Maps a chunk of sentences to vocabulary indices on the worker pool.
    fn index_chunk(&self, model: &Word2VecModel, chunk: &[Vec<String>]) -> Vec<Vec<usize>> {
        self.pool.install(|| {
            chunk
                .par_iter()
                .map(|sent| sent.iter().filter_map(|w| model.index.get(w).copied()).collect::<Vec<usize>>())
                .collect()
        })
    }

    fn subsample(&mut self, sent: Vec<usize>) -> Vec<usize> {
        sent.into_iter().filter(|w| {
            let p = self.keep_probs[*w];
            p >= 1.0 || self.rng.gen::<f32>() < p
        }).collect()
    }

    /// One positive and `negative` noise updates of the output weights against
    /// `input`; returns the error to propagate to the input side.
    fn negative_update(&mut self, model: &mut Word2VecModel, input: &Array1<f32>, target: usize, lr: f32) -> Array1<f32> {

        let mut neu1e: Array1<f32> = Array1::zeros(input.len());
        for d in 0..=model.params.negative {
            let (word, label) = if d == 0 {
                (target, 1.0)
            } else {
                let word = self.noise.sample(&mut self.rng);
                if word == target {
                    continue;
                }
                (word, 0.0)
            };

            let f = input.dot(&model.syn1neg.row(word));
            let g = (label - sigmoid(f)) * lr;
            neu1e.scaled_add(g, &model.syn1neg.row(word));
            model.syn1neg.row_mut(word).scaled_add(g, input);
        }
        neu1e
    }

    fn train_sentence(&mut self, model: &mut Word2VecModel, sent: &[usize], lr: f32) {

        let window = model.params.window;
        for (pos, center) in sent.iter().enumerate() {

            // effective window drawn per centre word
            let reduced = window - self.rng.gen_range(0..window);
            let start = pos.saturating_sub(reduced);
            let end = (pos + reduced + 1).min(sent.len());
            let context: Vec<usize> = (start..end).filter(|j| *j != pos).map(|j| sent[j]).collect();
            if context.is_empty() {
                continue;
            }

            if model.params.sg {
                // each context word predicts the centre word
                for word in context {
                    let input = model.input_vector(word);
                    let neu1e = self.negative_update(model, &input, *center, lr);
                    model.apply_input_error(word, &neu1e);
                }
            } else {
                // the mean of the context predicts the centre word
                let mut input: Array1<f32> = Array1::zeros(model.params.size);
                for word in &context {
                    input += &model.input_vector(*word);
                }
                input /= context.len() as f32;
                let neu1e = self.negative_update(model, &input, *center, lr);
                for word in &context {
                    model.apply_input_error(*word, &neu1e);
                }
            }
        }
    }

    fn train_chunk(&mut self, model: &mut Word2VecModel, chunk: &[Vec<String>]) {
        for sent in self.index_chunk(model, chunk) {
            let n_words = sent.len() as u64;
            let lr = self.learning_rate(&model.params);
            let sent = self.subsample(sent);
            self.train_sentence(model, &sent, lr);
            self.words_done += n_words;
        }
    }

}

fn sigmoid(f: f32) -> f32 {
    if f > MAX_EXP {
        1.0
    } else if f < -MAX_EXP {
        0.0
    } else {
        1.0 / (1.0 + (-f).exp())
    }
}

/// Character n-grams of `<word>` with lengths `min_n..=max_n`.
pub fn char_ngrams(word: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = format!("<{}>", word).chars().collect();
    let mut grams = Vec::new();
    for n in min_n..=max_n.min(chars.len()) {
        for start in 0..=(chars.len() - n) {
            grams.push(chars[start..start + n].iter().collect());
        }
    }
    grams
}

/// 32-bit FNV-1a over the bytes, each byte sign-extended like fastText does.
pub fn ft_hash(s: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for b in s.bytes() {
        h ^= b as i8 as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

fn subword_buckets(word: &str, min_n: usize, max_n: usize, bucket: usize) -> Vec<usize> {
    char_ngrams(word, min_n, max_n).iter().map(|g| ft_hash(g) as usize % bucket).collect()
}


/// Trains a model over `epochs` passes of the sentences.
pub fn train<S: SentenceSource + ?Sized>(sentences: &S, params: &Word2vecConfig) -> Result<Word2VecModel> {

    let mut rng = StdRng::seed_from_u64(params.seed);
    let (words, counts) = Word2VecModel::build_vocab(sentences, params)?;
    let mut model = Word2VecModel::new(words, counts, params, &mut rng);
    let mut sgd = Sgd::new(&model, rng)?;

    for epoch in 0..params.epochs {

        let timer = Instant::now();
        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(CHUNK_SENTENCES);
        for sent in sentences.pass() {
            chunk.push(sent?);
            if chunk.len() == CHUNK_SENTENCES {
                sgd.train_chunk(&mut model, &chunk);
                chunk.clear();
                debug!("epoch {}: {} / {} words, lr {}", epoch, sgd.words_done, sgd.words_total, sgd.learning_rate(params));
            }
        }
        sgd.train_chunk(&mut model, &chunk);

        info!("finished epoch {}, took {} seconds", epoch, timer.elapsed().as_secs());
    }

    Ok(model)
}

/// Trains and writes either the word vectors (word2vec text format) or the whole model.
pub fn run(sentences: &Sentences, params: &Word2vecConfig) -> Result<Word2VecModel> {

    info!("start training");
    let model = train(sentences, params)?;

    info!("training finished, saving model to {}", params.save_to.display());
    if params.vectors_only {
        save_output(&params.save_to, &model.word_vectors()?)?;
    } else {
        save_output(&params.save_to, &model)?;
    }
    Ok(model)
}
