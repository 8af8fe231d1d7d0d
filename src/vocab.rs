use crate::config::files_handling::{read_input, read_lines};
use crate::config::{Encoding, OovConfig};
use crate::error::{Result, WordvecError};

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub type Vocab = BTreeSet<String>;

/// Words present in every one of the vocabulary files.
pub fn shared_vocab(paths: &[PathBuf], encoding: Encoding) -> Result<Vocab> {

    let (first, rest) = paths.split_first()
        .ok_or_else(|| WordvecError::Config("no vocabulary files given".to_string()))?;

    let mut shared: Vocab = read_input(first, encoding)?;
    for path in rest {
        let vocab: Vocab = read_input(path, encoding)?;
        shared.retain(|w| vocab.contains(w));
    }
    Ok(shared)
}

/// Splits the comma separated `paths` parameter.
pub fn split_paths(paths: &str) -> Vec<PathBuf> {
    paths.split(',').map(str::trim).filter(|p| !p.is_empty()).map(PathBuf::from).collect()
}

/// The tokens of a word2vec text file. A token ends at the first field that
/// reads as a number, so multi-word tokens come back joined by one space.
pub fn vectors_vocab(path: &Path, encoding: Encoding) -> Result<Vocab> {

    let mut lines = read_lines(path, encoding)?;
    let header = lines.next().transpose()?.unwrap_or_default();
    let total: u64 = header.split_whitespace().next().and_then(|n| n.parse().ok()).unwrap_or(0);

    let progress = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}<{eta_precise}]") {
        progress.set_style(style);
    }

    let mut vocab = Vocab::new();
    for line in lines {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let k = fields.iter().position(|f| f.parse::<f64>().is_ok()).unwrap_or(fields.len());
        vocab.insert(fields[..k].join(" "));
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(vocab)
}

pub fn write_vocab<W: Write>(vocab: &Vocab, out: &mut W) -> Result<()> {
    for w in vocab {
        writeln!(out, "{}", w)?;
    }
    out.flush()?;
    Ok(())
}

/// Whether an analogy line survives the vocabulary filter. Strict mode asks
/// for every alternative of every slot to be known, loose mode for one per slot.
pub fn analogy_in_vocab(line: &str, vocab: &Vocab, lower: bool, strict: bool) -> bool {
    line.split_whitespace().all(|slot| {
        let mut alternatives = slot.split('/').map(|w| if lower { w.to_lowercase() } else { w.to_string() });
        if strict {
            alternatives.all(|w| vocab.contains(&w))
        } else {
            alternatives.any(|w| vocab.contains(&w))
        }
    })
}

/// Copies the analogy file, dropping questions with words outside the
/// vocabulary. Section titles always pass. Returns (kept, dropped).
pub fn remove_oov<W: Write>(params: &OovConfig, out: &mut W) -> Result<(usize, usize)> {

    info!("reading vocabulary from {}", params.vocab_path.display());
    let vocab: Vocab = read_input(&params.vocab_path, params.encoding)?;

    info!("processing analogies from {}", params.analogy_path.display());
    let mut kept = 0;
    let mut dropped = 0;
    for line in read_lines(&params.analogy_path, params.encoding)? {
        let line = line?;
        if line.starts_with(':') {
            writeln!(out, "{}", line.trim_end())?;
        } else if analogy_in_vocab(&line, &vocab, params.lower, params.strict) {
            writeln!(out, "{}", line.trim_end())?;
            kept += 1;
        } else {
            dropped += 1;
        }
    }
    out.flush()?;

    info!("kept {} questions, dropped {}", kept, dropped);
    Ok((kept, dropped))
}


#[cfg(test)]
mod tests {

    use super::*;
    use std::fs;

    fn vocab_of(words: &[&str]) -> Vocab {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn shared_vocab_is_an_order_free_intersection() {

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");
        fs::write(&a, "raja\nratu\n pria \nwanita\n").unwrap();
        fs::write(&b, "pria\nratu\nanjing\n").unwrap();
        fs::write(&c, "ratu\npria\nraja\n").unwrap();

        let ab = shared_vocab(&[a.clone(), b.clone()], Encoding::Utf8).unwrap();
        let ba = shared_vocab(&[b.clone(), a.clone()], Encoding::Utf8).unwrap();
        assert_eq!(ab, vocab_of(&["pria", "ratu"]));
        assert_eq!(ab, ba);

        let abc = shared_vocab(&[a.clone(), b.clone(), c.clone()], Encoding::Utf8).unwrap();
        let cab = shared_vocab(&[c, a, b], Encoding::Utf8).unwrap();
        assert_eq!(abc, cab);

        assert!(matches!(shared_vocab(&[], Encoding::Utf8), Err(WordvecError::Config(_))));
        assert_eq!(split_paths("v1.txt, v2.txt,"), vec![PathBuf::from("v1.txt"), PathBuf::from("v2.txt")]);
    }

    #[test]
    fn vectors_vocab_joins_fields_before_the_first_number() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        fs::write(&path, "3 3\nnew york 1.0 2.0 3.0\nyork -0.5 1e-3 2\nthe 0 0 0\n").unwrap();

        let vocab = vectors_vocab(&path, Encoding::Utf8).unwrap();
        assert_eq!(vocab, vocab_of(&["new york", "the", "york"]));

        let mut out: Vec<u8> = Vec::new();
        write_vocab(&vocab, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "new york\nthe\nyork\n");
    }

    #[test]
    fn oov_filter_modes() {

        let vocab = vocab_of(&["king", "man", "woman", "queen"]);

        // one known alternative per slot is enough in loose mode
        assert!(analogy_in_vocab("King man/pria woman queen", &vocab, true, false));
        assert!(!analogy_in_vocab("King man/pria woman queen", &vocab, true, true));
        assert!(analogy_in_vocab("king man woman queen", &vocab, true, true));

        // without lowercasing "King" is unknown
        assert!(!analogy_in_vocab("King man woman queen", &vocab, false, false));
        assert!(!analogy_in_vocab("king man woman ratu", &vocab, true, false));

        let vocab = vocab_of(&["king", "man", "woman"]);
        assert!(!analogy_in_vocab("king man woman queen", &vocab, true, false));
        assert!(analogy_in_vocab("king man woman/women king", &vocab, true, false));
    }

    #[test]
    fn remove_oov_keeps_sections_and_known_questions() {

        let dir = tempfile::tempdir().unwrap();
        let analogy_path = dir.path().join("analogy.txt");
        let vocab_path = dir.path().join("vocab.txt");
        fs::write(&vocab_path, "king\nman\nwoman\nqueen\n").unwrap();
        fs::write(&analogy_path, ": family  \nking man woman queen\nking man/pria woman queen\nraja pria wanita ratu\n").unwrap();

        let mut params = OovConfig {
            analogy_path,
            vocab_path,
            encoding: Encoding::Utf8,
            lower: true,
            strict: true,
        };

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(remove_oov(&params, &mut out).unwrap(), (1, 2));
        assert_eq!(String::from_utf8(out).unwrap(), ": family\nking man woman queen\n");

        params.strict = false;
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(remove_oov(&params, &mut out).unwrap(), (2, 1));
        assert_eq!(String::from_utf8(out).unwrap(), ": family\nking man woman queen\nking man/pria woman queen\n");
    }

    #[test]
    fn default_filter_drops_partially_known_slots() {
        let params = OovConfig::from_config(&crate::config::Config::from_value(serde_json::json!({}))).unwrap();
        let vocab = vocab_of(&["king", "man", "woman"]);
        assert!(!analogy_in_vocab("king man woman/women king", &vocab, params.lower, params.strict));
        assert!(analogy_in_vocab("king man woman king", &vocab, params.lower, params.strict));
    }
}
