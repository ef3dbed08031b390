#[derive(Debug)]
pub enum RdbErr {
    Io(std::io::Error),
    BadHeader,
    TooSmall,
    Encode(bincode::Error),
    NotFound(String),
    TypeMismatch(String),
    NameTooLong(String),
}

impl std::fmt::Display for RdbErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RdbErr::Io(error) => write!(f, "rdb io error: {error}"),
            RdbErr::BadHeader => write!(f, "rdb header is missing or has the wrong version"),
            RdbErr::TooSmall => write!(f, "rdb file is truncated"),
            RdbErr::Encode(error) => write!(f, "rdb entry could not be (de)serialized: {error}"),
            RdbErr::NotFound(name) => write!(f, "rdb entry `{name}` not found"),
            RdbErr::TypeMismatch(name) => {
                write!(f, "rdb entry `{name}` holds a different type")
            }
            RdbErr::NameTooLong(name) => {
                write!(f, "entry name `{name}` exceeds the 64 byte limit")
            }
        }
    }
}

impl From<std::io::Error> for RdbErr {
    fn from(value: std::io::Error) -> Self {
        RdbErr::Io(value)
    }
}

impl From<bincode::Error> for RdbErr {
    fn from(value: bincode::Error) -> Self {
        RdbErr::Encode(value)
    }
}

impl std::error::Error for RdbErr {}

#[derive(Debug)]
pub enum KomaError {
    LookupFailure(String),
    InvalidFrameRange { start: i64, end: i64 },
    TileSizeMismatch { expected: usize, actual: usize },
    Capture(String),
    MalformedPreview(String),
    Upload(String),
    JSONError(serde_json::Error),
    ImageError(image::ImageError),
    IOFailure(std::io::Error),
    RDBFileError(RdbErr),
}

impl KomaError {
    /// True for errors the UI should present as "no preview available".
    pub fn is_corrupt_preview(&self) -> bool {
        matches!(self, KomaError::MalformedPreview(_))
    }
}

impl std::fmt::Display for KomaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KomaError::LookupFailure(name) => write!(f, "no entry named `{name}`"),
            KomaError::InvalidFrameRange { start, end } => {
                write!(f, "frame range ({start}, {end}) holds no frames")
            }
            KomaError::TileSizeMismatch { expected, actual } => write!(
                f,
                "captured tile has {actual} floats, expected {expected}"
            ),
            KomaError::Capture(reason) => write!(f, "frame capture failed: {reason}"),
            KomaError::MalformedPreview(reason) => write!(f, "corrupt preview: {reason}"),
            KomaError::Upload(reason) => write!(f, "texture upload failed: {reason}"),
            KomaError::JSONError(error) => write!(f, "json error: {error}"),
            KomaError::ImageError(error) => write!(f, "image error: {error}"),
            KomaError::IOFailure(error) => write!(f, "io error: {error}"),
            KomaError::RDBFileError(rdb_err) => write!(f, "{rdb_err}"),
        }
    }
}

impl From<RdbErr> for KomaError {
    fn from(value: RdbErr) -> Self {
        KomaError::RDBFileError(value)
    }
}

impl From<serde_json::Error> for KomaError {
    fn from(value: serde_json::Error) -> Self {
        KomaError::JSONError(value)
    }
}

impl From<image::ImageError> for KomaError {
    fn from(value: image::ImageError) -> Self {
        KomaError::ImageError(value)
    }
}

impl From<std::io::Error> for KomaError {
    fn from(value: std::io::Error) -> Self {
        KomaError::IOFailure(value)
    }
}

impl std::error::Error for KomaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KomaError::JSONError(error) => Some(error),
            KomaError::ImageError(error) => Some(error),
            KomaError::IOFailure(error) => Some(error),
            KomaError::RDBFileError(error) => Some(error),
            _ => None,
        }
    }
}
