// imports
use crate::cli::{Cli, Command};
use crate::config::files_handling::open_write;
use crate::config::{Config, CorpusConfig, Encoding, EvalConfig, GloveConfig, OovConfig, PrepConfig, Word2vecConfig};
use crate::error::Result;
use crate::evaluate;
use crate::glove;
use crate::preprocess::Preprocessor;
use crate::sentences::{corpus_stats, write_glove_corpus, Sentences};
use crate::tracking::Run;
use crate::vectors::KeyedVectors;
use crate::vocab;
use crate::word2vec;

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Builds the parameters of the command, runs it and closes its run record.
pub fn execute(cli: &Cli) -> Result<()> {

    let name = cli.command.name();
    info!("building parameters...");
    let config = Config::new(cli.config.as_deref(), cli.command.overrides())?;

    let mut run = Run::start(&format!("wordvec-{}", name), &config);
    info!("starting {}...", name);
    let timer = Instant::now();

    let outcome = dispatch(&cli.command, &config, &mut run);
    run.finish(&outcome);
    outcome?;

    info!("finished {}, took {} seconds", name, timer.elapsed().as_secs());
    Ok(())
}

fn corpus_and_prep(config: &Config) -> Result<(CorpusConfig, Preprocessor)> {
    let corpus = CorpusConfig::from_config(config)?;
    let prep = PrepConfig::from_config(config)?;
    info!("{}", corpus);
    info!("{}", prep);
    Ok((corpus, Preprocessor::new(&prep)?))
}

fn glove_params(config: &Config) -> Result<GloveConfig> {
    let params = GloveConfig::from_config(config)?;
    info!("{}", params);
    Ok(params)
}

fn encoding(config: &Config, default: &str) -> Result<Encoding> {
    Encoding::parse(&config.get_str("encoding", default)?)
}

fn dispatch(command: &Command, config: &Config, run: &mut Run) -> Result<Value> {

    match command {
        Command::TrainWord2vec(_) => {
            let (corpus, prep) = corpus_and_prep(config)?;
            let params = Word2vecConfig::from_config(config)?;
            info!("{}", params);
            let model = word2vec::run(&Sentences::new(corpus, prep), &params)?;
            Ok(json!({ "vocab_size": model.words().len(), "save_to": params.save_to }))
        }
        Command::TrainGlove(_) => {
            let params = glove_params(config)?;
            glove::train(&params)?;
            Ok(json!({ "outdir": params.outdir }))
        }
        Command::VocabCount(_) => {
            let params = glove_params(config)?;
            glove::run_stage(&params, glove::vocab_count(&params))?;
            Ok(Value::Null)
        }
        Command::Cooccur(_) => {
            let params = glove_params(config)?;
            glove::run_stage(&params, glove::cooccur(&params))?;
            Ok(Value::Null)
        }
        Command::Shuffle(_) => {
            let params = glove_params(config)?;
            glove::run_stage(&params, glove::shuffle(&params))?;
            Ok(Value::Null)
        }
        Command::Glove(_) => {
            let params = glove_params(config)?;
            glove::run_stage(&params, glove::glove(&params))?;
            Ok(Value::Null)
        }
        Command::PrepGloveCorpus(_) => {
            let (corpus, prep) = corpus_and_prep(config)?;
            let output = config.get_opt_str("output")?.map(PathBuf::from);
            let mut out = open_write(output.as_deref())?;
            let n_docs = write_glove_corpus(&corpus, &prep, &mut out)?;
            info!("wrote {} articles", n_docs);
            Ok(json!(n_docs))
        }
        Command::CorpusStats(_) => {
            let (corpus, prep) = corpus_and_prep(config)?;
            let stats = corpus_stats(&corpus, &prep)?;
            run.log_scalar("num_articles", stats.num_articles as f64);
            run.log_scalar("num_tokens", stats.num_tokens as f64);
            run.log_scalar("num_types", stats.num_types as f64);
            println!("{}", stats);
            Ok(Value::Null)
        }
        Command::SharedVocab(_) => {
            let paths = vocab::split_paths(&config.get_str("paths", "vocab1.txt,vocab2.txt")?);
            let shared = vocab::shared_vocab(&paths, encoding(config, "utf-8")?)?;
            info!("{} words shared by {} files", shared.len(), paths.len());
            vocab::write_vocab(&shared, &mut open_write(None)?)?;
            Ok(json!(shared.len()))
        }
        Command::VectorsVocab(_) => {
            let path = PathBuf::from(config.get_str("path", "vectors.txt")?);
            let words = vocab::vectors_vocab(&path, encoding(config, "utf-8")?)?;
            vocab::write_vocab(&words, &mut open_write(None)?)?;
            Ok(json!(words.len()))
        }
        Command::RemoveOov(_) => {
            let params = OovConfig::from_config(config)?;
            let (kept, dropped) = vocab::remove_oov(&params, &mut open_write(None)?)?;
            Ok(json!({ "kept": kept, "dropped": dropped }))
        }
        Command::Evaluate(_) => {
            let params = EvalConfig::from_config(config)?;
            info!("{}", params);
            let acc = evaluate::evaluate(&params, run)?;
            Ok(json!(acc))
        }
        Command::PrintCorrects(_) => {
            let params = EvalConfig::from_config(config)?;
            evaluate::print_corrects(&params, &mut open_write(None)?)?;
            Ok(Value::Null)
        }
        Command::ConvertNpy(_) => {
            let tokens_path = PathBuf::from(config.get_str("tokens_path", "words.txt")?);
            let vectors_path = PathBuf::from(config.get_str("vectors_path", "vecs.npy")?);
            let output = config.get_opt_str("output")?.map(PathBuf::from);
            convert_npy(&tokens_path, &vectors_path, encoding(config, "latin1")?, output.as_deref())
        }
    }
}

fn convert_npy(tokens_path: &Path, vectors_path: &Path, encoding: Encoding, output: Option<&Path>) -> Result<Value> {
    let kv = KeyedVectors::from_npy(tokens_path, vectors_path, encoding)?;
    kv.write_word2vec_format(&mut open_write(output)?)?;
    Ok(json!({ "count": kv.len(), "dim": kv.dim() }))
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::corpus::tests::{doc_line, write_plain};
    use crate::error::WordvecError;
    use clap::Parser;
    use ndarray::Array2;
    use ndarray_npy::write_npy;
    use std::fs;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("wordvec").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn convert_npy_writes_word2vec_text() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = dir.path().join("words.txt");
        let vecs = dir.path().join("vecs.npy");
        let out = dir.path().join("vectors.txt");
        fs::write(&tokens, "<UNK>\nkucing\n").unwrap();
        write_npy(&vecs, &Array2::<f32>::from_shape_vec((2, 2), vec![0.5, 1.0, -1.0, 2.0]).unwrap()).unwrap();

        let out_arg = format!("output={}", out.display());
        let tokens_arg = format!("tokens_path={}", tokens.display());
        let vecs_arg = format!("vectors_path={}", vecs.display());
        execute(&cli(&["convert-npy", &tokens_arg, &vecs_arg, &out_arg])).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "2 2\n<UNK> 0.5 1\nkucing -1 2\n");
    }

    #[test]
    fn train_word2vec_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tempo");
        let lines: Vec<String> = (0..30)
            .map(|i| doc_line(&[&["Raja", "dan", "ratu", "tinggal", "di", "istana", if i % 2 == 0 { "2019" } else { "." }]]))
            .collect();
        write_plain(&root.join("kt"), 2005, &lines);

        let save_to = dir.path().join("out").join("vectors.txt");
        let args: Vec<String> = vec![
            "train-word2vec".to_string(),
            format!("corpus.path={}", root.display()),
            "corpus.product=kt".to_string(),
            "corpus.kt_end=2005".to_string(),
            "size=6".to_string(),
            "min_count=1".to_string(),
            "epochs=1".to_string(),
            "workers=1".to_string(),
            format!("save_to={}", save_to.display()),
        ];
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        execute(&cli(&args)).unwrap();

        let kv = KeyedVectors::load_word2vec_format(&save_to, Encoding::Utf8).unwrap();
        assert_eq!(kv.dim(), 6);
        assert!(kv.contains("raja") && kv.contains("@@NUM@@"));
        assert!(!kv.contains("."));
    }

    #[test]
    fn errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let missing = format!("corpus.path={}", dir.path().join("nowhere").display());
        assert!(matches!(
            execute(&cli(&["corpus-stats", &missing, "corpus.product=mbm"])),
            Err(WordvecError::Corpus { .. })
        ));
        assert!(matches!(execute(&cli(&["evaluate", "encoding=cp1252"])), Err(WordvecError::Config(_))));
    }
}
