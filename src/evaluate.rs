// imports
use crate::config::files_handling::read_lines;
use crate::config::{Encoding, EvalConfig};
use crate::error::{Result, WordvecError};
use crate::tracking::Run;
use crate::vectors::KeyedVectors;

use indicatif::ProgressBar;
use ndarray::Array1;
use ndarray_stats::interpolate::Linear;
use ndarray_stats::Quantile1dExt;
use noisy_float::types::{n64, N64};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One analogy question `a : b :: c : d`, each slot holding `/`-separated
/// alternatives.
#[derive(Clone, Debug, PartialEq)]
pub struct Question {
    pub section: String,
    pub slots: [String; 4],
}

/// Reads an analogy file. Lines starting with `": "` open a new section,
/// every other line must hold exactly four words.
pub fn read_analogies(path: &Path, encoding: Encoding, lower: bool) -> Result<Vec<Question>> {

    let mut questions = Vec::new();
    let mut section = String::new();

    for (i, line) in read_lines(path, encoding)?.enumerate() {
        let line = line?;
        if let Some(name) = line.strip_prefix(": ") {
            section = name.trim().to_string();
            continue;
        }

        let line = if lower { line.to_lowercase() } else { line };
        let words: Vec<&str> = line.split_whitespace().collect();
        let slots: [String; 4] = match words.as_slice() {
            [a, b, c, d] => [a.to_string(), b.to_string(), c.to_string(), d.to_string()],
            _ => return Err(WordvecError::AnalogyFormat { line: i + 1, found: words.len() }),
        };
        questions.push(Question { section: section.to_owned(), slots });
    }
    Ok(questions)
}

/// Whether any alternative of the fourth slot is among the `at` words most
/// similar to `a - b + c`.
pub fn is_correct(kv: &KeyedVectors, question: &Question, at: usize) -> Result<bool> {

    let [a, b, c, d] = &question.slots;
    let positive: Vec<&str> = a.split('/').chain(c.split('/')).collect();
    let negative: Vec<&str> = b.split('/').collect();

    let similar = kv.most_similar(&positive, &negative, at)?;
    Ok(d.split('/').any(|target| similar.iter().any(|(w, _)| w == target)))
}

/// 0/1 labels per section, sections in the order they first got a label.
#[derive(Debug, Default, PartialEq)]
pub struct Corrects {
    sections: Vec<(String, Vec<u8>)>,
}

impl Corrects {

    fn push(&mut self, section: &str, label: u8) {
        match self.sections.iter_mut().find(|(name, _)| name == section) {
            Some((_, labels)) => labels.push(label),
            None => self.sections.push((section.to_string(), vec![label])),
        }
    }

    pub fn sections(&self) -> &[(String, Vec<u8>)] {
        &self.sections
    }

    pub fn sorted(&self) -> Vec<&(String, Vec<u8>)> {
        let mut sorted: Vec<&(String, Vec<u8>)> = self.sections.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
    }

    /// All labels pooled, section by section.
    pub fn pooled(&self) -> Vec<f64> {
        self.sections.iter().flat_map(|(_, labels)| labels.iter().map(|&c| c as f64)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Scores every question. Questions with unknown words are dropped when
/// `skip_oov` is set and counted as wrong otherwise.
pub fn get_corrects(kv: &KeyedVectors, questions: &[Question], params: &EvalConfig) -> Result<Corrects> {

    let pool = rayon::ThreadPoolBuilder::new().num_threads(params.workers).build()?;
    let labels: Vec<Option<u8>> = pool.install(|| {
        questions
            .par_iter()
            .map(|q| match is_correct(kv, q, params.at) {
                Ok(correct) => Ok(Some(correct as u8)),
                Err(WordvecError::NotInVocabulary(w)) if params.skip_oov => {
                    debug!("word '{}' not in vocabulary, skipping", w);
                    Ok(None)
                }
                Err(WordvecError::NotInVocabulary(w)) => {
                    debug!("word '{}' not in vocabulary, assuming incorrect", w);
                    Ok(Some(0))
                }
                Err(e) => Err(e),
            })
            .collect::<Result<Vec<Option<u8>>>>()
    })?;

    let mut corrects = Corrects::default();
    for (q, label) in questions.iter().zip(labels) {
        if let Some(label) = label {
            corrects.push(&q.section, label);
        }
    }
    Ok(corrects)
}

pub fn mean(xs: &[f64]) -> Result<f64> {
    Array1::from(xs.to_vec()).mean()
        .ok_or_else(|| WordvecError::InvalidSample("no samples".to_string()))
}

/// Quantile interpolating linearly between the two closest ranks.
fn quantile(xs: &mut Array1<N64>, q: f64) -> Result<f64> {
    xs.quantile_mut(n64(q), &Linear)
        .map(|x| x.raw())
        .map_err(|e| WordvecError::InvalidSample(e.to_string()))
}

/// Basic bootstrap confidence interval of the mean at level `alpha`.
pub fn bootstrap_ci<R: Rng>(samples: &[f64], alpha: f64, n_samples: usize, rng: &mut R) -> Result<(f64, f64)> {

    if samples.is_empty() {
        return Err(WordvecError::InvalidSample("no samples".to_string()));
    }
    if n_samples == 0 {
        return Err(WordvecError::InvalidSample("number of bootstrap samples must be positive".to_string()));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(WordvecError::InvalidSample(format!("alpha must be in (0, 1), got {}", alpha)));
    }

    info!("computing confidence interval via bootstrapping");
    let progress = ProgressBar::new(n_samples as u64);
    let k = samples.len();
    let mut bs_means: Array1<N64> = Array1::from_shape_fn(n_samples, |_| {
        let total: f64 = (0..k).map(|_| samples[rng.gen_range(0..k)]).sum();
        progress.inc(1);
        n64(total / k as f64)
    });
    progress.finish_and_clear();

    let qlo = 0.5 * (1.0 - alpha);
    let qhi = 1.0 - qlo;
    let (bs_mean_lo, bs_mean_hi) = (quantile(&mut bs_means, qlo)?, quantile(&mut bs_means, qhi)?);
    let m = mean(samples)?;
    Ok((2.0 * m - bs_mean_hi, 2.0 * m - bs_mean_lo))
}

fn load_and_score(params: &EvalConfig) -> Result<Corrects> {
    let kv = KeyedVectors::load_word2vec_format(&params.vectors_path, params.encoding)?;
    info!("reading analogies from {}", params.analogy_path.display());
    let questions = read_analogies(&params.analogy_path, params.encoding, params.lower)?;
    get_corrects(&kv, &questions, params)
}

/// Accuracy per section and overall with its bootstrap interval. Returns the
/// overall accuracy.
pub fn evaluate(params: &EvalConfig, run: &mut Run) -> Result<f64> {

    let corrects = load_and_score(params)?;
    if corrects.is_empty() {
        return Err(WordvecError::InvalidSample("no analogy question could be scored".to_string()));
    }

    info!("accuracies:");
    for (section, labels) in corrects.sections() {
        let labels: Vec<f64> = labels.iter().map(|&c| c as f64).collect();
        let acc = mean(&labels)?;
        run.log_scalar(&format!("acc({})", section), acc);
        info!("{} : {:.2}%", section, acc * 100.0);
    }

    let all_corrects = corrects.pooled();
    let acc = mean(&all_corrects)?;
    run.log_scalar("acc(**overall**)", acc);
    info!("**overall** : {:.2}%", acc * 100.0);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let (acc_lo, acc_hi) = bootstrap_ci(&all_corrects, params.alpha, params.n_samples, &mut rng)?;
    run.log_scalar("acc_lo(**overall**)", acc_lo);
    run.log_scalar("acc_hi(**overall**)", acc_hi);
    info!("confidence interval: [{:.2}%, {:.2}%]", acc_lo * 100.0, acc_hi * 100.0);

    Ok(acc)
}

/// Writes the 0/1 label of every scored question, sections sorted by name.
pub fn print_corrects<W: Write>(params: &EvalConfig, out: &mut W) -> Result<()> {
    let corrects = load_and_score(params)?;
    for (_, labels) in corrects.sorted() {
        for label in labels {
            writeln!(out, "{}", label)?;
        }
    }
    out.flush()?;
    Ok(())
}
