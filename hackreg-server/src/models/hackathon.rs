//! Hackathon record

use serde::{Deserialize, Serialize};

/// One hackathon event. At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hackathon {
    pub uid: String,
    pub name: String,
    /// Epoch milliseconds
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    /// Base of the check-in pins handed out for this event
    #[serde(default)]
    pub base_pin: Option<i64>,
    #[serde(default)]
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_rows_decode() {
        let hackathon: Hackathon =
            serde_json::from_value(json!({ "uid": "h1", "name": "Fall 2026" })).unwrap();
        assert_eq!(hackathon.start_time, None);
        assert!(!hackathon.active);
    }
}
