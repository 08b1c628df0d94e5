//! Grow-only counter workload payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CounterPayload {
    Add { delta: i64 },
    AddOk,
    Read,
    ReadOk { value: i64 },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_counter_bodies() {
        let add: CounterPayload =
            serde_json::from_value(json!({"type": "add", "msg_id": 1, "delta": -2})).unwrap();
        assert_eq!(add, CounterPayload::Add { delta: -2 });

        assert_eq!(
            serde_json::to_value(CounterPayload::ReadOk { value: 3 }).unwrap(),
            json!({"type": "read_ok", "value": 3})
        );
    }
}
