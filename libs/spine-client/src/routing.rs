//! Interaction → CPA id routing table.
//!
//! Loaded once at startup and shared read-only. The JSON accepted is either
//! the `CPA_ID_MAP` array of `[interactionId, cpaId]` pairs or a plain object.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<String, String>,
}

impl RoutingTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let routes: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if routes.is_empty() {
            return Err(Error::RoutingTable("routing table is empty".to_string()));
        }
        Ok(Self { routes })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::RoutingTable(format!("not valid JSON: {e}")))?;

        let pairs = match value {
            Value::Array(entries) => entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Array(pair) => match pair.as_slice() {
                        [Value::String(k), Value::String(v)] => Ok((k.clone(), v.clone())),
                        _ => Err(Error::RoutingTable(
                            "entries must be [interactionId, cpaId] string pairs".to_string(),
                        )),
                    },
                    other => Err(Error::RoutingTable(format!("unexpected entry {other}"))),
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(v) => Ok((k, v)),
                    other => Err(Error::RoutingTable(format!("CPA id for {k} is not a string: {other}"))),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(Error::RoutingTable(
                    "expected an array of pairs or an object".to_string(),
                ))
            }
        };

        Self::from_pairs(pairs)
    }

    pub fn cpa_id(&self, interaction_id: &str) -> Result<&str> {
        self.routes
            .get(interaction_id)
            .map(String::as_str)
            .ok_or_else(|| Error::Routing {
                interaction_id: interaction_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
