use crate::saver::types::SaverKey;

/// Reasons an inbound message is dropped
///
/// None of these are fatal; the dispatcher logs them and moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum SaverError {
    /// Topic fits neither the registration nor the data shape
    MalformedTopic(String),
    /// Registration addressed to another saver instance
    ForeignSystem(String),
    /// Registration kind other than `min`/`max`
    UnknownKind(String),
    InvalidInterval(String),
    InvalidValue(String),
    /// Removal of a saver that was never registered
    UnknownSaver(SaverKey),
}

impl std::fmt::Display for SaverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaverError::MalformedTopic(topic) => write!(f, "Unknown topic '{}'", topic),
            SaverError::ForeignSystem(topic) => write!(f, "Topic '{}' addressed to another system", topic),
            SaverError::UnknownKind(kind) => write!(f, "Unknown saver kind '{}' (expected min or max)", kind),
            SaverError::InvalidInterval(payload) => {
                write!(f, "Invalid reset interval '{}' (expected positive hours)", payload)
            }
            SaverError::InvalidValue(payload) => write!(f, "Invalid value '{}' (expected a number)", payload),
            SaverError::UnknownSaver(key) => write!(f, "Saver {} not registered", key),
        }
    }
}

impl std::error::Error for SaverError {}
