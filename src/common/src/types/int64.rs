//! protojson writes int64 fields as decimal strings. These helpers write strings and accept
//! either strings or plain numbers when reading.

use serde::de::Error;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(i64),
    Text(String),
}

impl Repr {
    fn into_i64<E: Error>(self) -> Result<i64, E> {
        match self {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid int64 value {:?}", text))),
        }
    }
}

pub mod required {
    use super::Repr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Repr::deserialize(deserializer)?.into_i64()
    }
}

pub mod option {
    use super::Repr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::into_i64)
            .transpose()
    }
}

pub mod vec {
    use super::Repr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[i64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|value| value.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(Repr::into_i64)
            .collect()
    }
}
