use serde::{Deserialize, Serialize};

use crate::models::Message;

// -- History --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub count: usize,
    pub messages: Vec<Message>,
}

impl From<Vec<Message>> for MessageListResponse {
    fn from(messages: Vec<Message>) -> Self {
        Self {
            count: messages.len(),
            messages,
        }
    }
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
