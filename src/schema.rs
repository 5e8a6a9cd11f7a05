// Stored shapes from earlier schema generations and their upgrades
//
// Records are decoded into a per-entity shape type, then upgraded into the
// current model once, at load time. Consumers only ever see current models.
// Records no shape accepts are carried as raw JSON so rewrites keep them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{Client, Contact};
use crate::record::Entity;

/// A client as written by either schema generation
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientShape {
    Contacts(Client),
    SingleContact(LegacyClient),
}

/// First-generation client: one email and phone on the client itself
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyClient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub color_palette: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<LegacyClient> for Client {
    fn from(legacy: LegacyClient) -> Self {
        let blank_to_none = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let contact = Contact {
            name: legacy.name.clone(),
            email: blank_to_none(legacy.email),
            phone: blank_to_none(legacy.phone),
        };

        Client {
            id: legacy.id,
            name: legacy.name,
            contacts: vec![contact],
            logo: legacy.logo,
            color_palette: legacy.color_palette,
            notes: legacy.notes,
            created_at: legacy.created_at,
            updated_at: legacy.updated_at.unwrap_or(legacy.created_at),
            extra: legacy.extra,
        }
    }
}

impl From<ClientShape> for Client {
    fn from(shape: ClientShape) -> Self {
        match shape {
            ClientShape::Contacts(client) => client,
            ClientShape::SingleContact(legacy) => legacy.into(),
        }
    }
}

/// One slot of a stored collection
///
/// `Unreadable` holds a record no known shape accepted, exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stored<T> {
    Record(T),
    Unreadable(Value),
}

impl<T> Stored<T> {
    pub fn record(&self) -> Option<&T> {
        match self {
            Stored::Record(record) => Some(record),
            Stored::Unreadable(_) => None,
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut T> {
        match self {
            Stored::Record(record) => Some(record),
            Stored::Unreadable(_) => None,
        }
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            Stored::Record(record) => Some(record),
            Stored::Unreadable(_) => None,
        }
    }
}

/// Decode one stored record through its entity's shape
pub fn upgrade_record<T: Entity>(value: Value) -> Result<T, serde_json::Error> {
    let shape: T::Shape = serde_json::from_value(value)?;
    Ok(shape.into())
}

/// Decode a stored collection, keeping unreadable records in place
pub fn decode_records<T: Entity>(values: Vec<Value>) -> Vec<Stored<T>> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match T::Shape::deserialize(&value) {
            Ok(shape) => Stored::Record(shape.into()),
            Err(e) => {
                warn!(
                    key = T::storage_key(),
                    index,
                    error = %e,
                    "Keeping record with unrecognized shape as-is"
                );
                Stored::Unreadable(value)
            }
        })
        .collect()
}

/// Decode a stored collection, dropping records no known shape accepts
pub fn upgrade_records<T: Entity>(values: Vec<Value>) -> Vec<T> {
    decode_records(values)
        .into_iter()
        .filter_map(Stored::into_record)
        .collect()
}

/// Instant written as `YYYY-MM-DDTHH:MM:SS.sssZ`, the form the desk app stores
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

pub mod opt_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => super::timestamp::serialize(at, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer)
    }
}

/// Date-only field written as `YYYY-MM-DD`; full timestamps are accepted on read
pub mod date_field {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        NaiveDate::parse_from_str(s, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
            .or_else(|| s.get(..10).and_then(|head| NaiveDate::parse_from_str(head, FORMAT).ok()))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| D::Error::custom(format!("invalid date: {}", s)))
    }
}

/// Optional variant of [`date_field`]; empty strings read as absent
pub mod opt_date_field {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => super::date_field::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::date_field::parse(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {}", s))),
        }
    }
}
