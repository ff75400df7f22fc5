use thiserror::Error;

use super::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-2xx status. The full response is kept.
    #[error("HTTP {}: {}", .response.status.as_u16(), ApiError::summarize(.response))]
    Status { response: Box<ApiResponse> },

    /// No response at all: connect failure, timeout, or a request that could
    /// not be built.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    fn summarize(response: &ApiResponse) -> String {
        Self::truncate_body(&response.body)
    }

    pub fn from_response(response: ApiResponse) -> Self {
        ApiError::Status {
            response: Box::new(response),
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { response } => Some(response.status.as_u16()),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }

    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ApiError::Status { response } => Some(response),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The server's `{"error": "..."}` message, when it sent one.
    pub fn server_message(&self) -> Option<String> {
        let response = self.response()?;
        let data = response.data();
        data.get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
