use std::fmt::{Display, Formatter};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Transaction;

/// The kinds of entity kept in the world state. Stored as the `type` field
/// of every record so that selector queries can filter on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Election,
    Voter,
    Ballot,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Election => "election",
            Self::Voter => "voter",
            Self::Ballot => "ballot",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain type that is persisted as a typed record under its own key.
pub trait Entity: Serialize + DeserializeOwned {
    const TYPE: RecordType;

    /// The world state key of this entity.
    fn key(&self) -> &str;
}

/// The on-disk shape: the entity's own fields plus the `type` discriminator.
#[derive(Serialize, Deserialize)]
struct Tagged<E> {
    #[serde(rename = "type")]
    kind: RecordType,
    #[serde(flatten)]
    entity: E,
}

/// Just enough of a record to learn its kind.
#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Serialize an entity into record bytes.
pub fn encode<E: Entity>(entity: &E) -> Result<Vec<u8>> {
    let tagged = Tagged {
        kind: E::TYPE,
        entity,
    };
    Ok(serde_json::to_vec(&tagged)?)
}

/// Deserialize the record stored under `key`, checking it holds an `E`.
pub fn decode<E: Entity>(key: &str, bytes: &[u8]) -> Result<E> {
    let header: Header = serde_json::from_slice(bytes)?;
    if header.kind.as_deref() != Some(E::TYPE.as_str()) {
        return Err(Error::RecordType {
            key: key.to_string(),
            expected: E::TYPE,
            found: header.kind.unwrap_or_else(|| "untyped record".to_string()),
        });
    }
    let tagged: Tagged<E> = serde_json::from_slice(bytes)?;
    Ok(tagged.entity)
}

/// Read an entity through the transaction, if present.
pub async fn load<E: Entity>(ctx: &Transaction<'_>, key: &str) -> Result<Option<E>> {
    match ctx.get_state(key).await? {
        Some(bytes) if !bytes.is_empty() => decode(key, &bytes).map(Some),
        _ => Ok(None),
    }
}

/// Write an entity through the transaction under its own key.
pub fn save<E: Entity>(ctx: &mut Transaction<'_>, entity: &E) -> Result<()> {
    let bytes = encode(entity)?;
    ctx.put_state(entity.key(), bytes);
    Ok(())
}

/// A record as returned to callers: parsed JSON where possible, the raw
/// text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Structured(serde_json::Value),
    Raw(String),
}

impl RecordValue {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// One row of a selector query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRecord {
    pub key: String,
    pub record: RecordValue,
}

#[cfg(test)]
mod tests {
    use crate::model::{Election, Voter};

    use super::*;

    #[test]
    fn encoded_records_carry_their_type() {
        let bytes = encode(&Voter::example(&Election::example())).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "voter");
        assert_eq!(json["voterId"], "V1");
        assert_eq!(json["ballotCreated"], false);
        assert_eq!(json["ballot"], serde_json::Value::Null);
    }

    #[test]
    fn decode_checks_the_type() {
        let election = Election::example();
        let bytes = encode(&election).unwrap();
        assert_eq!(decode::<Election>("E1", &bytes).unwrap(), election);

        let result = decode::<Voter>("E1", &bytes);
        assert!(matches!(
            result,
            Err(Error::RecordType { expected: RecordType::Voter, ref found, .. }) if found == "election"
        ));

        let result = decode::<Voter>("X", br#"{"value": "7"}"#);
        assert!(matches!(
            result,
            Err(Error::RecordType { ref found, .. }) if found == "untyped record"
        ));
    }

    #[test]
    fn unparseable_records_fall_back_to_text() {
        assert_eq!(
            RecordValue::from_bytes(b"not json"),
            RecordValue::Raw("not json".to_string())
        );
        assert_eq!(
            RecordValue::from_bytes(br#"{"a":1}"#),
            RecordValue::Structured(serde_json::json!({"a": 1}))
        );
    }
}
