//! Job data structure

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KernelResult;

/// An opaque unit of assignable work
///
/// The payload is interpreted only by the worker factory it is dispatched
/// to; the kernel never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: Vec<u8>,
}

impl Job {
    /// Create a job with a generated unique id
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
        }
    }

    pub fn with_id(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Payload as text, for handlers with string payloads
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Decode a JSON payload
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> KernelResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Job::new(b"x".to_vec());
        let b = Job::new(b"x".to_vec());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_decode_json_payload() {
        #[derive(serde::Deserialize)]
        struct Payload {
            from: u64,
        }

        let job = Job::with_id("j1", br#"{"from": 42}"#.to_vec());
        let decoded: Payload = job.decode().unwrap();
        assert_eq!(decoded.from, 42);

        let bad = Job::with_id("j2", b"not json".to_vec());
        assert!(bad.decode::<Payload>().is_err());
    }
}
