//! JSON helpers shared by the request, response and error types.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// A path into a GraphQL response, as found in [`crate::graphql::Error::path`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

/// One segment of a [`Path`]: a response key or a list index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index into a list.
    Index(usize),

    /// A response key of an object.
    Key(String),
}

impl Path {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> From<&'a str> for PathElement {
    fn from(key: &'a str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => write!(f, "{key}"),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

/// Builds a [`Path`] from a list of keys and indices.
///
/// ```ignore
/// let path = path!["w1__gqltf__x", 0];
/// ```
#[macro_export]
macro_rules! path {
    ($($element:expr),* $(,)?) => {
        $crate::json_ext::Path(vec![$($crate::json_ext::PathElement::from($element)),*])
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn path_serializes_as_a_flat_array() {
        let path = crate::path!["user", 3, "name"];
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            json!(["user", 3, "name"])
        );
        let back: Path = serde_json::from_value(json!(["user", 3, "name"])).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn path_display() {
        insta::assert_snapshot!(crate::path!["user", 3, "name"], @"/user/3/name");
        insta::assert_snapshot!(Path::empty(), @"");
    }
}
