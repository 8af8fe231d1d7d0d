// imports
use crate::config::files_handling::{open_write, read_lines};
use crate::config::{Encoding, GloveConfig};
use crate::error::{Result, WordvecError};

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::info;

pub const VOCAB_FNAME: &str = "vocab.txt";
pub const COOCCUR_FNAME: &str = "cooccurences.bin";
pub const SHUF_FNAME: &str = "cooccurences.shuf.bin";
pub const VECTORS_FNAME: &str = "vectors";
pub const W2V_VECTORS_FNAME: &str = "vectors.w2v.txt";

/// One invocation of a GloVe command line tool, with its standard streams
/// bound to files.
#[derive(Clone, Debug)]
pub struct Stage {
    pub name: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
}

impl Stage {

    fn new(params: &GloveConfig, name: &'static str) -> Stage {
        // an empty bindir means the binaries are found through PATH
        let program = if params.bindir.as_os_str().is_empty() { PathBuf::from(name) } else { params.bindir.join(name) };
        Stage { name, program, args: Vec::new(), stdin: None, stdout: None }
    }

    fn arg<T: Display>(mut self, flag: &str, value: T) -> Stage {
        self.args.push(flag.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Runs the tool to completion. A non-zero exit status becomes
    /// `StageFailed` carrying that status.
    pub fn run(&self) -> Result<()> {

        info!("running {}", self);
        let timer = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(path) = &self.stdin {
            cmd.stdin(Stdio::from(File::open(path)?));
        }
        if let Some(path) = &self.stdout {
            cmd.stdout(Stdio::from(File::create(path)?));
        }

        let status = cmd.status().map_err(|e| {
            io::Error::new(e.kind(), format!("cannot run {}: {}", self.program.display(), e))
        })?;
        if !status.success() {
            // killed by a signal, no status to hand back
            let code = status.code().unwrap_or(1);
            return Err(WordvecError::StageFailed { stage: self.name.to_string(), code });
        }

        info!("finished {}, took {} seconds", self.name, timer.elapsed().as_secs());
        Ok(())
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(path) = &self.stdin {
            write!(f, " < {}", path.display())?;
        }
        if let Some(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}


pub fn vocab_count(params: &GloveConfig) -> Stage {
    let mut stage = Stage::new(params, "vocab_count")
        .arg("-min-count", params.min_count);
    stage.stdin = Some(params.corpus.clone());
    stage.stdout = Some(params.outdir.join(VOCAB_FNAME));
    stage
}

pub fn cooccur(params: &GloveConfig) -> Stage {
    let mut stage = Stage::new(params, "cooccur")
        .arg("-vocab-file", params.outdir.join(VOCAB_FNAME).display())
        .arg("-window-size", params.window)
        .arg("-overflow-file", params.outdir.join("overflow").display());
    stage.stdin = Some(params.corpus.clone());
    stage.stdout = Some(params.outdir.join(COOCCUR_FNAME));
    stage
}

pub fn shuffle(params: &GloveConfig) -> Stage {
    // shuffle does not finish its output without a verbose level set
    let mut stage = Stage::new(params, "shuffle")
        .arg("-verbose", 2)
        .arg("-temp-file", params.outdir.join("temp_shuffle").display());
    stage.stdin = Some(params.outdir.join(COOCCUR_FNAME));
    stage.stdout = Some(params.outdir.join(SHUF_FNAME));
    stage
}

pub fn glove(params: &GloveConfig) -> Stage {
    Stage::new(params, "glove")
        .arg("-vector-size", params.size)
        .arg("-threads", params.workers)
        .arg("-iter", params.epochs)
        .arg("-input-file", params.outdir.join(SHUF_FNAME).display())
        .arg("-vocab-file", params.outdir.join(VOCAB_FNAME).display())
        .arg("-save-file", params.outdir.join(VECTORS_FNAME).display())
        .arg("-binary", 0) // save as text
        .arg("-model", 1) // save only the word vectors
}

/// Runs a single stage inside the output directory.
pub fn run_stage(params: &GloveConfig, stage: Stage) -> Result<()> {
    fs::create_dir_all(&params.outdir)?;
    stage.run()
}

/// The full pipeline: vocab_count, cooccur, shuffle, glove. The first failing
/// stage stops everything.
pub fn train(params: &GloveConfig) -> Result<()> {

    fs::create_dir_all(&params.outdir)?;
    for stage in [vocab_count(params), cooccur(params), shuffle(params), glove(params)] {
        stage.run()?;
    }

    if params.word2vec_header {
        let src = params.outdir.join(format!("{}.txt", VECTORS_FNAME));
        let dst = params.outdir.join(W2V_VECTORS_FNAME);
        let (count, dim) = add_word2vec_header(&src, &dst, params.encoding)?;
        info!("wrote {} vectors of dimension {} to {}", count, dim, dst.display());
    }
    Ok(())
}

/// Copies GloVe's header-less text vectors, prefixing the `count dim` line
/// of the word2vec format.
pub fn add_word2vec_header(src: &Path, dst: &Path, encoding: Encoding) -> Result<(usize, usize)> {

    let mut count = 0;
    let mut dim = 0;
    for (i, line) in read_lines(src, encoding)?.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let n_fields = line.split_whitespace().count();
        if i == 0 {
            dim = n_fields.saturating_sub(1);
        } else if n_fields != dim + 1 {
            return Err(WordvecError::VectorsFormat {
                line: i + 1,
                reason: format!("expected {} values, found {}", dim, n_fields.saturating_sub(1)),
            });
        }
        count += 1;
    }

    let mut out = open_write(Some(dst))?;
    writeln!(out, "{} {}", count, dim)?;
    for line in read_lines(src, encoding)? {
        let line = line?;
        if !line.trim().is_empty() {
            writeln!(out, "{}", line)?;
        }
    }
    out.flush()?;
    Ok((count, dim))
}


#[cfg(test)]
mod tests {

    use super::*;

    fn params(outdir: &Path, bindir: &Path) -> GloveConfig {
        GloveConfig {
            corpus: PathBuf::from("corpus.txt"),
            size: 50,
            window: 8,
            min_count: 3,
            epochs: 20,
            workers: 4,
            outdir: outdir.to_path_buf(),
            bindir: bindir.to_path_buf(),
            word2vec_header: true,
            encoding: Encoding::Utf8,
        }
    }

    #[test]
    fn stages_are_wired_through_the_output_directory() {

        let p = params(Path::new("out"), Path::new(""));

        let stage = vocab_count(&p);
        assert_eq!(stage.to_string(), "vocab_count -min-count 3 < corpus.txt > out/vocab.txt");

        let stage = cooccur(&p);
        assert_eq!(stage.to_string(),
            "cooccur -vocab-file out/vocab.txt -window-size 8 -overflow-file out/overflow < corpus.txt > out/cooccurences.bin");

        let stage = shuffle(&p);
        assert_eq!(stage.to_string(),
            "shuffle -verbose 2 -temp-file out/temp_shuffle < out/cooccurences.bin > out/cooccurences.shuf.bin");

        let stage = glove(&p);
        assert_eq!(stage.args, vec![
            "-vector-size", "50", "-threads", "4", "-iter", "20",
            "-input-file", "out/cooccurences.shuf.bin", "-vocab-file", "out/vocab.txt",
            "-save-file", "out/vectors", "-binary", "0", "-model", "1",
        ]);
        assert!(stage.stdin.is_none() && stage.stdout.is_none());

        let p = params(Path::new("out"), Path::new("/opt/glove/build"));
        assert_eq!(glove(&p).program, PathBuf::from("/opt/glove/build/glove"));
    }

    #[test]
    fn header_is_prepended() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vectors.txt");
        let dst = dir.path().join("vectors.w2v.txt");
        fs::write(&src, "the 0.1 0.2 0.3\nof 0.4 0.5 0.6\n").unwrap();

        assert_eq!(add_word2vec_header(&src, &dst, Encoding::Utf8).unwrap(), (2, 3));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "2 3\nthe 0.1 0.2 0.3\nof 0.4 0.5 0.6\n");

        fs::write(&src, "the 0.1 0.2 0.3\nof 0.4\n").unwrap();
        assert!(matches!(add_word2vec_header(&src, &dst, Encoding::Utf8), Err(WordvecError::VectorsFormat { line: 2, .. })));
    }

    #[test]
    fn header_rewrite_decodes_latin1_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vectors.txt");
        let dst = dir.path().join("vectors.w2v.txt");
        fs::write(&src, b"caf\xe9 0.1 0.2\nthe 0.3 0.4\n").unwrap();

        assert!(add_word2vec_header(&src, &dst, Encoding::Utf8).is_err());
        assert_eq!(add_word2vec_header(&src, &dst, Encoding::Latin1).unwrap(), (2, 2));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "2 2\ncafé 0.1 0.2\nthe 0.3 0.4\n");
    }

    #[cfg(unix)]
    #[test]
    fn pipeline_runs_in_order_and_stops_at_first_failure() {

        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bindir = dir.path().join("bin");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&bindir).unwrap();

        let write_tool = |name: &str, body: &str| {
            let path = bindir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        };
        write_tool("vocab_count", "cat > /dev/null\necho \"kata 12\"");
        write_tool("cooccur", "cat");
        write_tool("shuffle", "cat\ntouch \"$(dirname \"$0\")/shuffle.ran\"");
        write_tool("glove", concat!(
            "while [ $# -gt 0 ]; do\n",
            "  if [ \"$1\" = \"-save-file\" ]; then out=\"$2\"; fi\n",
            "  shift\n",
            "done\n",
            "printf 'kata 0.5 0.25\\nlain 1 2\\n' > \"$out.txt\"",
        ));

        let corpus = dir.path().join("corpus.txt");
        fs::write(&corpus, "kata lain kata\n").unwrap();
        let mut p = params(&outdir, &bindir);
        p.corpus = corpus;

        train(&p).unwrap();
        assert_eq!(fs::read_to_string(outdir.join(VOCAB_FNAME)).unwrap(), "kata 12\n");
        assert_eq!(fs::read_to_string(outdir.join(SHUF_FNAME)).unwrap(), "kata lain kata\n");
        assert!(bindir.join("shuffle.ran").exists());
        assert_eq!(fs::read_to_string(outdir.join(W2V_VECTORS_FNAME)).unwrap(), "2 2\nkata 0.5 0.25\nlain 1 2\n");

        // a failing stage stops the pipeline and keeps its status
        fs::remove_file(bindir.join("shuffle.ran")).unwrap();
        write_tool("cooccur", "exit 3");
        match train(&p) {
            Err(e @ WordvecError::StageFailed { .. }) => {
                assert_eq!(e.exit_code(), 3);
                assert!(matches!(e, WordvecError::StageFailed { ref stage, .. } if stage == "cooccur"));
            }
            other => panic!("expected a failed stage, got {:?}", other),
        }
        assert!(!bindir.join("shuffle.ran").exists());

        // a missing tool is an io error naming it
        let p = params(&outdir, &dir.path().join("nowhere"));
        assert!(matches!(run_stage(&p, glove(&p)), Err(WordvecError::Io(_))));
    }
}
