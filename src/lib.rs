pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod glove;
pub mod preprocess;
pub mod run;
pub mod sentences;
pub mod tracking;
pub mod vectors;
pub mod vocab;
pub mod word2vec;

pub use cli::Cli;
pub use config::files_handling;
pub use error::{Result, WordvecError};
pub use preprocess::Preprocessor;
pub use sentences::Sentences;
pub use vectors::KeyedVectors;
pub use word2vec::Word2VecModel;
