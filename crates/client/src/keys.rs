//! Query keys: composite identifiers for cached result sets.

use focal_core::types::DbId;

use crate::types::ProjectStatus;

/// Filter parameters identifying one cached list page.
///
/// Two list queries with the same page/search/status share a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListFilter {
    pub page: i64,
    pub q: Option<String>,
    pub status: Option<ProjectStatus>,
}

/// Key identifying one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// One page of the project list for a given filter set.
    List(ListFilter),
    /// A single project detail by id.
    Detail(DbId),
}

/// A set of cache keys a mutation touches, used for cancellation,
/// snapshotting, staleness marking, and mutual exclusion between
/// overlapping mutations.
///
/// `Lists` covers every `QueryKey::List` regardless of filter; a mutation
/// cannot know which cached pages its row appears on, so it treats them all
/// as touched (matching how the server list endpoint is invalidated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Lists,
    Detail(DbId),
}

impl QueryKey {
    /// Whether this key falls inside the given scope.
    pub fn in_scope(&self, scope: Scope) -> bool {
        match (self, scope) {
            (QueryKey::List(_), Scope::Lists) => true,
            (QueryKey::Detail(id), Scope::Detail(target)) => *id == target,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_keys_share_the_lists_scope() {
        let a = QueryKey::List(ListFilter::default());
        let b = QueryKey::List(ListFilter {
            page: 3,
            q: Some("site".into()),
            status: None,
        });
        assert!(a.in_scope(Scope::Lists));
        assert!(b.in_scope(Scope::Lists));
        assert!(!a.in_scope(Scope::Detail(1)));
    }

    #[test]
    fn detail_scope_matches_only_its_id() {
        let key = QueryKey::Detail(7);
        assert!(key.in_scope(Scope::Detail(7)));
        assert!(!key.in_scope(Scope::Detail(8)));
        assert!(!key.in_scope(Scope::Lists));
    }
}
