//! Serde glue for string maps whose document order matters.
//!
//! Lorebooks and avatar maps are written as JSON objects. Matching walks them in the
//! order the author wrote them, so they are kept as vectors of pairs instead of hash maps.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// An entry that is stored as one `"key": "value"` member of a JSON object.
pub(crate) trait KeyedPair: Sized {
    fn key(&self) -> &str;
    fn value(&self) -> &str;
    fn from_pair(key: String, value: String) -> Self;
}

#[allow(clippy::ptr_arg)]
pub(crate) fn serialize<S, T>(items: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: KeyedPair,
{
    let mut map = serializer.serialize_map(Some(items.len()))?;
    for item in items {
        map.serialize_entry(item.key(), item.value())?;
    }
    map.end()
}

pub(crate) fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: KeyedPair,
{
    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

struct OrderedVisitor<T>(PhantomData<T>);

impl<'de, T: KeyedPair> Visitor<'de> for OrderedVisitor<T> {
    type Value = Vec<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of strings to strings")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut items: Vec<T> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            // Duplicate keys: last write wins, first position is kept.
            if let Some(existing) = items.iter_mut().find(|item| item.key() == key) {
                *existing = T::from_pair(key, value);
            } else {
                items.push(T::from_pair(key, value));
            }
        }
        Ok(items)
    }
}
