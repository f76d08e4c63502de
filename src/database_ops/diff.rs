use crate::models::{app_id_key, CatalogEntry, RemoteListing};
use std::collections::HashSet;

/// Remote listings whose app id (case-insensitive) is not yet persisted.
pub fn diff(persisted: &[CatalogEntry], remote: &[RemoteListing]) -> Vec<RemoteListing> {
    let known: HashSet<String> = persisted.iter().map(|e| app_id_key(&e.app_id)).collect();
    remote
        .iter()
        .filter(|r| !known.contains(&app_id_key(&r.app_id)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, app_id: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            app_id: app_id.into(),
            name: name.into(),
            multiplayer: None,
        }
    }

    #[test]
    fn returns_only_unpersisted_listings() {
        let persisted = vec![entry("x", "1", "A")];
        let remote = vec![RemoteListing::new("1", "A"), RemoteListing::new("2", "B")];
        assert_eq!(diff(&persisted, &remote), vec![RemoteListing::new("2", "B")]);
    }

    #[test]
    fn empty_when_everything_is_persisted() {
        let persisted = vec![entry("x", "1", "A"), entry("y", "2", "B")];
        let remote = vec![RemoteListing::new("2", "B"), RemoteListing::new("1", "A")];
        assert!(diff(&persisted, &remote).is_empty());
    }

    #[test]
    fn empty_persisted_returns_all_remote() {
        let remote = vec![RemoteListing::new("1", "A"), RemoteListing::new("2", "B")];
        assert_eq!(diff(&[], &remote), remote);
        assert!(diff(&[entry("x", "1", "A")], &[]).is_empty());
    }

    #[test]
    fn app_id_match_ignores_case_and_name() {
        let persisted = vec![entry("x", "AB", "Old name")];
        assert!(diff(&persisted, &[RemoteListing::new("ab", "New name")]).is_empty());
    }
}
