use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("{file} is missing required column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("archive contains no entry matching '{pattern}'")]
    MissingEntry { pattern: &'static str },

    #[error("{0} is not valid UTF-8")]
    Encoding(String),

    #[error("could not recognize the export format of {0}")]
    UnrecognizedFormat(String),
}
