// imports
use crate::error::{Result, WordvecError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Merged JSON parameters of one command: the optional JSON file first, then
/// the `key=value` overrides given on the command line. Missing keys fall back
/// to the defaults carried by the typed getters.
#[derive(Clone, Debug)]
pub struct Config {
    json: Value,
}

impl Config {

    pub fn new(config_file: Option<&Path>, overrides: &[String]) -> Result<Config> {

        // parse input json, if any
        let mut json = match config_file {
            Some(path) => {
                let f = File::open(path).map_err(|e| {
                    WordvecError::Config(format!("cannot open config file {}: {}", path.display(), e))
                })?;
                serde_json::from_reader(BufReader::new(f))?
            }
            None => Value::Object(Map::new()),
        };
        if !json.is_object() {
            return Err(WordvecError::Config("config file must hold a json object".to_string()));
        }

        // apply command line overrides on top
        for item in overrides {
            let (key, raw) = item.split_once('=').ok_or_else(|| {
                WordvecError::Config(format!("override '{}' is not of the form key=value", item))
            })?;
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            set_dotted(&mut json, key.trim(), value)?;
        }

        // fix the seed now so that it is recorded with the rest of the parameters
        if json.get("seed").is_none() {
            set_dotted(&mut json, "seed", Value::from(time_seed()))?;
        }

        Ok(Config { json })
    }

    pub fn from_value(json: Value) -> Config {
        Config { json }
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.json, |node, part| node.get(part))
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.lookup(key) {
            Some(v) => v.as_u64().ok_or_else(|| wrong_type(key, "a non-negative integer")),
            None => Ok(default),
        }
    }

    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        u32::try_from(self.get_u64(key, default as u64)?)
            .map_err(|_| WordvecError::Config(format!("given {} is out of range", key)))
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize> {
        usize::try_from(self.get_u64(key, default as u64)?)
            .map_err(|_| WordvecError::Config(format!("given {} is out of range", key)))
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.lookup(key) {
            Some(v) => v.as_f64().ok_or_else(|| wrong_type(key, "numeric")),
            None => Ok(default),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.lookup(key) {
            Some(v) => v.as_bool().ok_or_else(|| wrong_type(key, "boolean")),
            None => Ok(default),
        }
    }

    pub fn get_str(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get_opt_str(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn get_opt_str(&self, key: &str) -> Result<Option<String>> {
        match self.lookup(key) {
            // numbers given on the command line are parsed as json, take them back as text
            Some(Value::String(s)) => Ok(Some(s.to_owned())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    pub fn seed(&self) -> Result<u64> {
        self.get_u64("seed", 0)
    }

}

fn wrong_type(key: &str, expected: &str) -> WordvecError {
    WordvecError::Config(format!("given {} is not {}", key, expected))
}

fn set_dotted(json: &mut Value, key: &str, value: Value) -> Result<()> {

    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts.split_last().ok_or_else(|| WordvecError::Config("empty key".to_string()))?;

    let mut node = json;
    for part in parents {
        let obj = node.as_object_mut().ok_or_else(|| wrong_type(key, "inside an object"))?;
        node = obj.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    let obj = node.as_object_mut().ok_or_else(|| wrong_type(key, "inside an object"))?;
    obj.insert(last.to_string(), value);
    Ok(())
}

fn time_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() % 1_000_000_007).unwrap_or(0)
}

pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    if cpus > 1 { cpus - 1 } else { 1 }
}


/// Text encodings accepted for corpus, vocabulary and vectors files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {

    pub fn parse(name: &str) -> Result<Encoding> {
        match name.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(WordvecError::Config(format!("unsupported encoding {}", other))),
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> std::io::Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            // every byte is the code point of the same value
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Utf8 => write!(f, "utf-8"),
            Encoding::Latin1 => write!(f, "latin1"),
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Product {
    Kt,
    Mbm,
    All,
}

impl Product {
    pub fn parse(name: &str) -> Result<Product> {
        match name {
            "kt" => Ok(Product::Kt),
            "mbm" => Ok(Product::Mbm),
            "all" => Ok(Product::All),
            _ => Err(WordvecError::Config("product must be one of 'kt', 'mbm', or 'all'".to_string())),
        }
    }
}

impl Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Product::Kt => write!(f, "kt"),
            Product::Mbm => write!(f, "mbm"),
            Product::All => write!(f, "all"),
        }
    }
}


#[derive(Clone, Debug)]
pub struct CorpusConfig {
    pub path: PathBuf,
    pub product: Product,
    pub kt_begin: u32,
    pub kt_end: u32,
    pub mbm_begin: u32,
    pub mbm_end: u32,
    pub encoding: Encoding,
}

impl CorpusConfig {
    pub fn from_config(config: &Config) -> Result<CorpusConfig> {
        Ok(CorpusConfig {
            path: PathBuf::from(config.get_str("corpus.path", "tempo")?),
            product: Product::parse(&config.get_str("corpus.product", "all")?)?,
            kt_begin: config.get_u32("corpus.kt_begin", 2005)?,
            kt_end: config.get_u32("corpus.kt_end", 2014)?,
            mbm_begin: config.get_u32("corpus.mbm_begin", 1999)?,
            mbm_end: config.get_u32("corpus.mbm_end", 2014)?,
            encoding: Encoding::parse(&config.get_str("corpus.encoding", "utf-8")?)?,
        })
    }
}

impl Display for CorpusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corpus parameters:
        path: {},
        product: {},
        kt years: {}-{},
        mbm years: {}-{},
        encoding: {}",
        self.path.display(), self.product, self.kt_begin, self.kt_end, self.mbm_begin, self.mbm_end, self.encoding)
    }
}


#[derive(Clone, Debug)]
pub struct PrepConfig {
    pub lower: bool,
    pub word_pattern: String,
    pub map_numbers: bool,
    pub number_token: String,
}

impl Default for PrepConfig {
    fn default() -> Self {
        PrepConfig {
            lower: true,
            word_pattern: r"[\w\-]+$".to_string(),
            map_numbers: true,
            number_token: "@@NUM@@".to_string(),
        }
    }
}

impl PrepConfig {
    pub fn from_config(config: &Config) -> Result<PrepConfig> {
        let default = PrepConfig::default();
        Ok(PrepConfig {
            lower: config.get_bool("prep.lower", default.lower)?,
            word_pattern: config.get_str("prep.word_pattern", &default.word_pattern)?,
            map_numbers: config.get_bool("prep.map_numbers", default.map_numbers)?,
            number_token: config.get_str("prep.number_token", &default.number_token)?,
        })
    }
}

impl Display for PrepConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "preprocessing parameters:
        lower: {},
        word_pattern: {},
        map_numbers: {},
        number_token: {}",
        self.lower, self.word_pattern, self.map_numbers, self.number_token)
    }
}


#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Word2vecConfig {
    pub size: usize,
    pub window: usize,
    pub min_count: usize,
    pub epochs: usize,
    pub use_fasttext: bool,
    pub sg: bool,
    pub negative: usize,
    pub sample: f64,
    pub alpha: f32,
    pub min_alpha: f32,
    pub min_n: usize,
    pub max_n: usize,
    pub bucket: usize,
    pub workers: usize,
    pub vectors_only: bool,
    pub save_to: PathBuf,
    pub seed: u64,
}

impl Word2vecConfig {
    pub fn from_config(config: &Config) -> Result<Word2vecConfig> {

        let params = Word2vecConfig {
            size: config.get_usize("size", 300)?,
            window: config.get_usize("window", 15)?,
            min_count: config.get_usize("min_count", 5)?,
            epochs: config.get_usize("epochs", 5)?,
            use_fasttext: config.get_bool("use_fasttext", false)?,
            sg: config.get_bool("sg", false)?,
            negative: config.get_usize("negative", 5)?,
            sample: config.get_f64("sample", 1e-3)?,
            alpha: config.get_f64("alpha", 0.025)? as f32,
            min_alpha: config.get_f64("min_alpha", 0.0001)? as f32,
            min_n: config.get_usize("min_n", 3)?,
            max_n: config.get_usize("max_n", 6)?,
            bucket: config.get_usize("bucket", 2_000_000)?,
            workers: config.get_usize("workers", default_workers())?,
            vectors_only: config.get_bool("vectors_only", true)?,
            save_to: PathBuf::from(config.get_str("save_to", "vectors.txt")?),
            seed: config.seed()?,
        };

        // validate what the trainer cannot work around
        if params.size == 0 || params.window == 0 || params.workers == 0 {
            return Err(WordvecError::Config("size, window and workers must be positive".to_string()));
        }
        if params.use_fasttext && (params.bucket == 0 || params.min_n == 0 || params.min_n > params.max_n) {
            return Err(WordvecError::Config("fastText needs bucket > 0 and 0 < min_n <= max_n".to_string()));
        }
        Ok(params)
    }
}

impl Display for Word2vecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        size: {},
        window: {},
        min_count: {},
        epochs: {},
        use_fasttext: {},
        sg: {},
        negative: {},
        sample: {},
        alpha: {} -> {},
        ngrams: {}-{} in {} buckets,
        workers: {},
        vectors_only: {},
        save_to: {},
        seed: {}",
        self.size, self.window, self.min_count, self.epochs, self.use_fasttext, self.sg, self.negative,
        self.sample, self.alpha, self.min_alpha, self.min_n, self.max_n, self.bucket, self.workers,
        self.vectors_only, self.save_to.display(), self.seed)
    }
}


#[derive(Clone, Debug)]
pub struct GloveConfig {
    pub corpus: PathBuf,
    pub size: usize,
    pub window: usize,
    pub min_count: usize,
    pub epochs: usize,
    pub workers: usize,
    pub outdir: PathBuf,
    pub bindir: PathBuf,
    pub word2vec_header: bool,
    pub encoding: Encoding,
}

impl GloveConfig {
    pub fn from_config(config: &Config) -> Result<GloveConfig> {
        Ok(GloveConfig {
            corpus: PathBuf::from(config.get_str("corpus", "corpus.txt")?),
            size: config.get_usize("size", 100)?,
            window: config.get_usize("window", 10)?,
            min_count: config.get_usize("min_count", 5)?,
            epochs: config.get_usize("epochs", 50)?,
            workers: config.get_usize("workers", default_workers())?,
            outdir: PathBuf::from(config.get_str("outdir", "output")?),
            bindir: PathBuf::from(config.get_str("bindir", "")?),
            word2vec_header: config.get_bool("word2vec_header", true)?,
            encoding: Encoding::parse(&config.get_str("encoding", "utf-8")?)?,
        })
    }
}

impl Display for GloveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "glove parameters:
        corpus: {},
        size: {},
        window: {},
        min_count: {},
        epochs: {},
        workers: {},
        outdir: {},
        bindir: {},
        word2vec_header: {},
        encoding: {}",
        self.corpus.display(), self.size, self.window, self.min_count, self.epochs, self.workers,
        self.outdir.display(), self.bindir.display(), self.word2vec_header, self.encoding)
    }
}


#[derive(Clone, Debug)]
pub struct EvalConfig {
    pub vectors_path: PathBuf,
    pub analogy_path: PathBuf,
    pub encoding: Encoding,
    pub lower: bool,
    pub at: usize,
    pub skip_oov: bool,
    pub alpha: f64,
    pub n_samples: usize,
    pub workers: usize,
    pub seed: u64,
}

impl EvalConfig {
    pub fn from_config(config: &Config) -> Result<EvalConfig> {
        Ok(EvalConfig {
            vectors_path: PathBuf::from(config.get_str("vectors_path", "vectors.txt")?),
            analogy_path: PathBuf::from(config.get_str("analogy_path", "analogy.txt")?),
            encoding: Encoding::parse(&config.get_str("encoding", "utf-8")?)?,
            lower: config.get_bool("lower", true)?,
            at: config.get_usize("at", 1)?,
            skip_oov: config.get_bool("skip_oov", true)?,
            alpha: config.get_f64("alpha", 0.95)?,
            n_samples: config.get_usize("n_samples", 1000)?,
            workers: config.get_usize("workers", default_workers())?,
            seed: config.seed()?,
        })
    }
}

impl Display for EvalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evaluation parameters:
        vectors_path: {},
        analogy_path: {},
        encoding: {},
        lower: {},
        at: {},
        skip_oov: {},
        alpha: {},
        n_samples: {},
        workers: {},
        seed: {}",
        self.vectors_path.display(), self.analogy_path.display(), self.encoding, self.lower, self.at,
        self.skip_oov, self.alpha, self.n_samples, self.workers, self.seed)
    }
}


#[derive(Clone, Debug)]
pub struct OovConfig {
    pub analogy_path: PathBuf,
    pub vocab_path: PathBuf,
    pub encoding: Encoding,
    pub lower: bool,
    pub strict: bool,
}

impl OovConfig {
    pub fn from_config(config: &Config) -> Result<OovConfig> {
        Ok(OovConfig {
            analogy_path: PathBuf::from(config.get_str("analogy_path", "analogy.txt")?),
            vocab_path: PathBuf::from(config.get_str("vocab_path", "vocab.txt")?),
            encoding: Encoding::parse(&config.get_str("encoding", "utf-8")?)?,
            lower: config.get_bool("lower", true)?,
            strict: config.get_bool("strict", true)?,
        })
    }
}


pub mod files_handling {

    use super::Encoding;
    use crate::error::{Result, WordvecError};

    use flate2::read::GzDecoder;
    use ndarray::Array2;
    use ndarray_npy::read_npy;
    use std::collections::BTreeSet;
    use std::fs::{self, File};
    use std::io::{self, BufRead, BufReader, BufWriter, Write};
    use std::path::Path;

    /// Opens a file for buffered reading, decompressing on the fly when the name ends in `.gz`.
    pub fn open_read(path: &Path) -> io::Result<Box<dyn BufRead>> {
        let f = File::open(path)?;
        if path.extension().map_or(false, |ext| ext == "gz") {
            Ok(Box::new(BufReader::new(GzDecoder::new(f))))
        } else {
            Ok(Box::new(BufReader::new(f)))
        }
    }

    /// Lines of a text file decoded with the given encoding, without the line terminator.
    pub struct DecodedLines {
        inner: io::Split<Box<dyn BufRead>>,
        encoding: Encoding,
    }

    impl Iterator for DecodedLines {
        type Item = io::Result<String>;

        fn next(&mut self) -> Option<Self::Item> {
            let mut bytes = match self.inner.next()? {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(e)),
            };
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            Some(self.encoding.decode(bytes))
        }
    }

    pub fn read_lines(path: &Path, encoding: Encoding) -> io::Result<DecodedLines> {
        Ok(DecodedLines { inner: open_read(path)?.split(b'\n'), encoding })
    }

    /// Stdout when no path is given, else a freshly created file.
    pub fn open_write(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                Ok(Box::new(BufWriter::new(File::create(path)?)))
            }
            None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
        }
    }

    pub fn read_input<R: ReadFile>(path: &Path, encoding: Encoding) -> Result<R> {
        R::read_file(path, encoding)
    }

    pub fn save_output<S: SaveFile>(path: &Path, item: &S) -> Result<()> {

        // create output folder
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        item.save_file(path)
    }

    pub trait ReadFile: Sized {
        fn read_file(path: &Path, encoding: Encoding) -> Result<Self>;
    }

    /// A vocabulary file: one word per line, surrounding whitespace removed.
    impl ReadFile for BTreeSet<String> {
        fn read_file(path: &Path, encoding: Encoding) -> Result<Self> {
            let mut vocab = BTreeSet::new();
            for line in read_lines(path, encoding)? {
                vocab.insert(line?.trim().to_string());
            }
            Ok(vocab)
        }
    }

    /// A token list in file order, one token per line.
    impl ReadFile for Vec<String> {
        fn read_file(path: &Path, encoding: Encoding) -> Result<Self> {
            let mut tokens = Vec::new();
            for line in read_lines(path, encoding)? {
                tokens.push(line?.trim_end().to_string());
            }
            Ok(tokens)
        }
    }

    impl ReadFile for Array2<f32> {
        fn read_file(path: &Path, _encoding: Encoding) -> Result<Self> {
            let item = read_npy(path).map_err(WordvecError::from)?;
            Ok(item)
        }
    }

    pub trait SaveFile {
        fn save_file(&self, path: &Path) -> Result<()>;
    }

}
