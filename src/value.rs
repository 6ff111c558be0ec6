use std::collections::{BTreeMap, btree_map};

/// A single literal bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A parameter value: either one scalar or an ordered list of scalars
/// that gets flattened into indexed placeholders before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(Value),
    List(Vec<Value>),
}

impl Param {
    pub fn is_list(&self) -> bool {
        matches!(self, Param::List(_))
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Scalar(Value::from(v))
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
);

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Scalar(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        Param::Scalar(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Param::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Param {
    fn from(v: &[T]) -> Self {
        Param::List(v.iter().cloned().map(Into::into).collect())
    }
}

/// Placeholder key to value mapping handed through the expansion pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Param>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Param>) -> Option<Param> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder flavour of [`Params::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Param> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Param> {
        self.0.iter()
    }
}

impl Extend<(String, Param)> for Params {
    fn extend<I: IntoIterator<Item = (String, Param)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Param>, const N: usize> From<[(K, V); N]> for Params {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl IntoIterator for Params {
    type Item = (String, Param);
    type IntoIter = btree_map::IntoIter<String, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Param);
    type IntoIter = btree_map::Iter<'a, String, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversions() {
        assert_eq!(Param::from(3), Param::Scalar(Value::Int(3)));
        assert_eq!(Param::from("a"), Param::Scalar(Value::Text("a".into())));
        assert_eq!(Param::from(None::<i64>), Param::Scalar(Value::Null));
        assert_eq!(
            Param::from(vec![1, 2]),
            Param::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(Param::from(vec!["x"]).is_list());
    }

    #[test]
    fn test_params_from_array() {
        let params = Params::from([("a", Param::from(1)), ("b", Param::from(vec![2, 3]))]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&Param::Scalar(Value::Int(1))));
    }
}
