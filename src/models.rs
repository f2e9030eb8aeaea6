use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A completed reply from the chat, one instance per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub text: String,
    pub chat_id: Option<String>,
    /// Reasoning trace, present when DeepThink was enabled for the request.
    pub deepthink_content: Option<String>,
    pub deepthink_duration: Option<Duration>,
    /// Present when search mode was enabled and the reply carried a results panel.
    pub search_results: Option<Vec<SearchResult>>,
}

impl Response {
    pub(crate) fn from_reply(reply: ExtractedReply, chat_id: Option<String>) -> Self {
        Self {
            text: reply.text,
            chat_id,
            deepthink_content: reply.deepthink_content,
            deepthink_duration: reply.deepthink_duration,
            search_results: reply.search_results,
        }
    }
}

/// One entry of the search panel attached to a search-enhanced reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub image_url: String,
    pub website: String,
    pub date: String,
    /// 1-based rank within the panel.
    pub index: u32,
    pub title: String,
    pub description: String,
}

/// Raw content pulled off the page by the poller, before the session stamps
/// the conversation id onto it.
#[derive(Debug, Clone, Default)]
pub struct ExtractedReply {
    pub text: String,
    pub deepthink_content: Option<String>,
    pub deepthink_duration: Option<Duration>,
    pub search_results: Option<Vec<SearchResult>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_round_trip_from_extracted_text() {
        let reply = ExtractedReply {
            text: "T".to_string(),
            ..Default::default()
        };
        let response = Response::from_reply(reply, None);
        assert_eq!(response.text, "T");
        assert!(response.deepthink_content.is_none());
        assert!(response.deepthink_duration.is_none());
        assert!(response.search_results.is_none());
    }

    #[test]
    fn test_response_carries_chat_id_and_metadata() {
        let reply = ExtractedReply {
            text: "answer".to_string(),
            deepthink_content: Some("trace".to_string()),
            deepthink_duration: Some(Duration::from_secs(12)),
            search_results: None,
        };
        let response = Response::from_reply(reply, Some("abc123".to_string()));
        assert_eq!(response.chat_id.as_deref(), Some("abc123"));
        assert_eq!(response.deepthink_content.as_deref(), Some("trace"));
        assert_eq!(response.deepthink_duration, Some(Duration::from_secs(12)));
    }
}
