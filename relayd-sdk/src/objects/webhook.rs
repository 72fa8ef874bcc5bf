//! Webhook event payload as streamed by the dispatch service.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Server-side namespace the webhook was received under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
}

/// The original HTTP request recorded by the dispatch service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    /// Absolute URL the request has to be relayed to.
    pub destination: String,
    /// Header values per key, in the order they were received.
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

/// One webhook to relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub bucket: Bucket,
    pub request: Request,
}

impl WebhookEvent {
    /// Convenience constructor used by tests and tooling.
    pub fn new(bucket: Bucket, method: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            bucket,
            request: Request {
                method: method.into(),
                destination: destination.into(),
                ..Request::default()
            },
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }
}

/// Bodies travel as unpadded RFC 4648 base64 inside JSON frames.
mod base64_body {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fast32::base64::RFC4648_NOPAD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        fast32::base64::RFC4648_NOPAD
            .decode_str(encoded.trim_end_matches('='))
            .map(Bytes::from)
            .map_err(|_| D::Error::custom("invalid base64 body"))
    }
}
