use crate::event::LogEvent;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// One labeled stream in a Loki push payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStream {
    pub stream: BTreeMap<String, String>,
    /// `(timestamp in nanoseconds as decimal text, log line)` pairs.
    pub values: Vec<(String, String)>,
}

/// The Loki push API envelope:
/// `{"streams": [{"stream": {...labels}, "values": [["<ns>", "<line>"], ...]}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRequest {
    pub streams: Vec<LogStream>,
}

impl PushRequest {
    pub fn entry_count(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }
}

/// Group an ordered slice of events into a delivery-ready push request.
///
/// Streams appear in first-seen-key order and entries keep their input order
/// within a stream. Labels are the static set plus `origin` and `category`,
/// with the dynamic pair winning any name collision. An event whose fields
/// fail to serialize is dropped on its own, never the whole batch.
pub fn build_push_request(
    events: &[LogEvent],
    static_labels: &HashMap<String, String>,
) -> PushRequest {
    let mut streams: Vec<LogStream> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let line = match serde_json::to_string(&event.fields) {
            Ok(line) => line,
            Err(e) => {
                warn!(
                    error = %e,
                    category = event.category,
                    "dropping event whose fields failed to serialize"
                );
                continue;
            }
        };

        let slot = *index.entry(event.stream_key()).or_insert_with(|| {
            let mut labels: BTreeMap<String, String> = static_labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            labels.insert("origin".to_string(), event.origin.as_str().to_string());
            labels.insert("category".to_string(), event.category.to_string());

            streams.push(LogStream {
                stream: labels,
                values: Vec::new(),
            });
            streams.len() - 1
        });

        streams[slot]
            .values
            .push((event.timestamp_ns.to_string(), line));
    }

    PushRequest { streams }
}
