//! Key layout of the overlay store.
//!
//! Every key lives under `<root>/<segment>/`. Object keys add the overlay id
//! and a trailing `/`, so the entries of one object form a subtree:
//!
//! ```text
//! polly/volumeinternallabels/mock-vol-000/            directory marker
//! polly/volumeinternallabels/mock-vol-000/ID          existence marker
//! polly/volumeinternallabels/mock-vol-000/Schedulers  JSON list
//! polly/volumeadmin/mock-vol-000/color                admin label
//! ```

use crate::error::{MetaStoreError, MetaStoreResult};
use std::fmt;
use std::str::FromStr;

/// Key of the root marker, relative to the root
pub const ROOT_MARKER: &str = "";
/// Leaf holding the schema version, relative to the root
pub const VERSION_LEAF: &str = "version";

/// Overlay data category. Each category owns one subtree under the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Mirror of provider extension fields
    ExternalFields,
    /// Internal bookkeeping; also the index of all known volume ids
    InternalLabels,
    /// Administrator labels
    AdminLabels,
    /// Snapshot extension fields
    Snapshot,
}

impl Category {
    /// Every category, in initialization order
    pub const ALL: [Self; 4] = [
        Self::ExternalFields,
        Self::InternalLabels,
        Self::AdminLabels,
        Self::Snapshot,
    ];

    /// Categories holding volume data
    pub const VOLUME: [Self; 3] = [Self::ExternalFields, Self::InternalLabels, Self::AdminLabels];

    /// Category used to answer "does this volume exist"
    pub const INDEX: Self = Self::InternalLabels;

    /// Path segment under the root
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::ExternalFields => "volumelibstorage",
            Self::InternalLabels => "volumeinternallabels",
            Self::AdminLabels => "volumeadmin",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "volumelibstorage" | "fields" => Ok(Self::ExternalFields),
            "volumeinternallabels" | "internal" => Ok(Self::InternalLabels),
            "volumeadmin" | "admin" | "labels" => Ok(Self::AdminLabels),
            "snapshot" | "snapshots" => Ok(Self::Snapshot),
            _ => Err(format!("unknown category: {s}")),
        }
    }
}

/// Builds and parses store keys for a given root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySchema {
    /// Root prefix including its trailing `/`, or empty
    prefix: String,
}

impl KeySchema {
    /// Create a schema rooted at `root`. Surrounding `/` are ignored and an
    /// empty root places categories at the top level.
    #[must_use]
    pub fn new(root: &str) -> Self {
        let root = root.trim().trim_matches('/');
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{root}/")
        };
        Self { prefix }
    }

    /// Root marker key (`<root>/`)
    #[must_use]
    pub fn root_marker(&self) -> String {
        format!("{}{ROOT_MARKER}", self.prefix)
    }

    /// Key holding the schema version
    #[must_use]
    pub fn version_key(&self) -> String {
        format!("{}{VERSION_LEAF}", self.prefix)
    }

    /// Root of a category: `<root>/<segment>/`
    #[must_use]
    pub fn root_key(&self, category: Category) -> String {
        format!("{}{}/", self.prefix, category.segment())
    }

    /// Subtree of one object: `<root>/<segment>/<id>/`
    pub fn object_key(&self, category: Category, id: &str) -> MetaStoreResult<String> {
        let id = sanitize(id);
        if id.is_empty() {
            return Err(MetaStoreError::InvalidIdentifier(
                "object id must not be empty".to_string(),
            ));
        }
        Ok(format!("{}{id}/", self.root_key(category)))
    }

    /// Number of `/`-separated segments in an object leaf key
    /// (`<root...>/<segment>/<id>/<leaf>`)
    #[must_use]
    pub fn leaf_depth(&self) -> usize {
        self.prefix.matches('/').count() + 3
    }
}

impl Default for KeySchema {
    fn default() -> Self {
        Self::new("polly")
    }
}

/// Leaf name of a key: the text after the last `/`
pub fn parse_leaf_key(key: &str) -> MetaStoreResult<&str> {
    key.rfind('/')
        .map(|pos| &key[pos + 1..])
        .ok_or_else(|| MetaStoreError::MalformedKey(key.to_string()))
}

fn sanitize(id: &str) -> &str {
    id.trim().trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_key() {
        let schema = KeySchema::default();
        assert_eq!(
            schema.root_key(Category::InternalLabels),
            "polly/volumeinternallabels/"
        );
        assert_eq!(schema.root_marker(), "polly/");
        assert_eq!(schema.version_key(), "polly/version");
    }

    #[test]
    fn test_object_key_sanitizes() {
        let schema = KeySchema::default();
        assert_eq!(
            schema.object_key(Category::AdminLabels, " /svcA-vol1/ ").unwrap(),
            "polly/volumeadmin/svcA-vol1/"
        );
    }

    #[test]
    fn test_object_key_empty_id() {
        let schema = KeySchema::default();
        for id in ["", "   ", "//"] {
            assert!(matches!(
                schema.object_key(Category::AdminLabels, id),
                Err(MetaStoreError::InvalidIdentifier(_))
            ));
        }
    }

    #[test]
    fn test_parse_leaf_key() {
        let schema = KeySchema::default();
        let key = schema.object_key(Category::AdminLabels, "svcA-vol1").unwrap() + "color";
        assert_eq!(parse_leaf_key(&key).unwrap(), "color");
        assert_eq!(parse_leaf_key("polly/volumeadmin/svcA-vol1/").unwrap(), "");
        assert!(matches!(
            parse_leaf_key("nosep"),
            Err(MetaStoreError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_custom_root() {
        let schema = KeySchema::new("/overlay/prod/");
        assert_eq!(
            schema.root_key(Category::Snapshot),
            "overlay/prod/snapshot/"
        );
        assert_eq!(schema.leaf_depth(), 5);

        let flat = KeySchema::new("");
        assert_eq!(flat.root_key(Category::AdminLabels), "volumeadmin/");
        assert_eq!(flat.leaf_depth(), 3);
        assert_eq!(KeySchema::default().leaf_depth(), 4);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("admin".parse::<Category>().unwrap(), Category::AdminLabels);
        assert_eq!(
            Category::ExternalFields.to_string().parse::<Category>().unwrap(),
            Category::ExternalFields
        );
        assert!("bogus".parse::<Category>().is_err());
    }
}
