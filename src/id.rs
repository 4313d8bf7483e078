//! Code for handling IDs
use std::sync::Arc;

/// A trait alias for ID types
pub trait IDLike:
    Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}
impl<T> IDLike for T where
    T: Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}

/// The string storage shared by all ID types.
///
/// IDs are moved between worker threads, so they use [`Arc`] rather than `Rc`.
pub type IDStr = Arc<str>;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `SourceID`, `AssetID`, etc.)
        pub struct $name(pub crate::id::IDStr);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }

            /// The ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}
pub(crate) use define_id_type;

/// Indicates that the struct has an ID field
pub trait HasID<ID: IDLike> {
    /// Get the struct's ID
    fn get_id(&self) -> &ID;
}

/// Implement the `HasID` trait for the given type, assuming it has a field called `id`
macro_rules! define_id_getter {
    ($t:ty, $id_ty:ty) => {
        impl crate::id::HasID<$id_ty> for $t {
            fn get_id(&self) -> &$id_ty {
                &self.id
            }
        }
    };
}
pub(crate) use define_id_getter;

/// Check that every item yielded by `iter` has a distinct ID.
///
/// # Returns
///
/// An error naming the first duplicated ID, if any.
pub fn check_unique_ids<'a, ID, T, I>(iter: I) -> anyhow::Result<()>
where
    ID: IDLike + 'a,
    T: HasID<ID> + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut seen = std::collections::HashSet::new();
    for item in iter {
        let id = item.get_id();
        anyhow::ensure!(seen.insert(id.clone()), "Duplicate ID found: {id}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    define_id_type! {GenericID}

    struct Item {
        id: GenericID,
    }
    define_id_getter! {Item, GenericID}

    #[test]
    fn test_check_unique_ids() {
        let items = [Item { id: "a".into() }, Item { id: "b".into() }];
        assert!(check_unique_ids::<GenericID, _, _>(&items).is_ok());

        let items = [Item { id: "a".into() }, Item { id: "a".into() }];
        assert_eq!(
            check_unique_ids::<GenericID, _, _>(&items).unwrap_err().to_string(),
            "Duplicate ID found: a"
        );
    }
}
