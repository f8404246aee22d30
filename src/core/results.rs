use serde::Serialize;

/// Success payload for update and delete commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationAck {
    pub status: &'static str,
    pub message: String,
}

impl MutationAck {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}
