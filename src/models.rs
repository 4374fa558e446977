use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: &'static str,
}

/// Outcome of one classification, used to populate the response page.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: &'static str,
    /// Percentage in [0, 100].
    pub confidence: f32,
}
