use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Word embedding experiments: corpus preparation, training drivers,
/// vocabulary utilities and analogy evaluation.
#[derive(Parser, Debug)]
#[command(name = "wordvec", version)]
pub struct Cli {
    /// JSON file with the parameters of the command
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct Overrides {
    /// Parameters applied over the config file, dotted keys reach nested sections
    #[arg(value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train word2vec or fastText vectors on the corpus
    TrainWord2vec(Overrides),
    /// Run the whole GloVe pipeline on a prepared corpus
    TrainGlove(Overrides),
    /// GloVe stage: count the vocabulary
    VocabCount(Overrides),
    /// GloVe stage: count co-occurrences
    Cooccur(Overrides),
    /// GloVe stage: shuffle co-occurrences
    Shuffle(Overrides),
    /// GloVe stage: fit the vectors
    Glove(Overrides),
    /// Write the corpus as one preprocessed article per line
    PrepGloveCorpus(Overrides),
    /// Count articles, word tokens and word types of the corpus
    CorpusStats(Overrides),
    /// Print the words shared by all given vocabulary files
    SharedVocab(Overrides),
    /// Print the vocabulary of a vectors file
    VectorsVocab(Overrides),
    /// Drop analogy questions with out-of-vocabulary words
    RemoveOov(Overrides),
    /// Analogy accuracy with a bootstrap confidence interval
    Evaluate(Overrides),
    /// Print the 0/1 correctness label of every analogy question
    PrintCorrects(Overrides),
    /// Convert a token list and a .npy matrix to word2vec text format
    ConvertNpy(Overrides),
}

impl Command {

    pub fn name(&self) -> &'static str {
        match self {
            Command::TrainWord2vec(_) => "train-word2vec",
            Command::TrainGlove(_) => "train-glove",
            Command::VocabCount(_) => "vocab-count",
            Command::Cooccur(_) => "cooccur",
            Command::Shuffle(_) => "shuffle",
            Command::Glove(_) => "glove",
            Command::PrepGloveCorpus(_) => "prep-glove-corpus",
            Command::CorpusStats(_) => "corpus-stats",
            Command::SharedVocab(_) => "shared-vocab",
            Command::VectorsVocab(_) => "vectors-vocab",
            Command::RemoveOov(_) => "remove-oov",
            Command::Evaluate(_) => "evaluate",
            Command::PrintCorrects(_) => "print-corrects",
            Command::ConvertNpy(_) => "convert-npy",
        }
    }

    pub fn overrides(&self) -> &[String] {
        match self {
            Command::TrainWord2vec(o)
            | Command::TrainGlove(o)
            | Command::VocabCount(o)
            | Command::Cooccur(o)
            | Command::Shuffle(o)
            | Command::Glove(o)
            | Command::PrepGloveCorpus(o)
            | Command::CorpusStats(o)
            | Command::SharedVocab(o)
            | Command::VectorsVocab(o)
            | Command::RemoveOov(o)
            | Command::Evaluate(o)
            | Command::PrintCorrects(o)
            | Command::ConvertNpy(o) => &o.set,
        }
    }
}
