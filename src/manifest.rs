//! Merging the local source tree with the live manifest.
//!
//! A deploy declares every path it wants served in the new version. Local
//! files always win; files that are only live remotely (other namespaces,
//! earlier deploys) are carried over untouched, so a deploy adds to the site
//! rather than mirroring the source tree.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::collector::LocalEntry;
use crate::error::{DeployError, DeployResult};

/// A file served by the currently live version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub hash: String,
}

/// Deploy path to content hash, one entry per path.
pub type DeclaredFileSet = BTreeMap<String, String>;

/// Hashes the backend does not hold yet.
pub type UploadRequiredSet = BTreeSet<String>;

/// Builds the file set to declare for a new version.
///
/// Later local entries overwrite earlier ones sharing a path. Remote entries
/// only fill paths no local entry claims.
pub fn diff(local: &[LocalEntry], remote: &[RemoteEntry]) -> DeclaredFileSet {
    let mut declared = DeclaredFileSet::new();
    for entry in local {
        declared.insert(entry.path.clone(), entry.hash.clone());
    }
    for entry in remote {
        declared
            .entry(entry.path.clone())
            .or_insert_with(|| entry.hash.clone());
    }
    declared
}

/// Number of declared paths that no local entry provides.
pub fn carried_over(declared: &DeclaredFileSet, local: &[LocalEntry]) -> usize {
    let local_paths: HashSet<&str> = local.iter().map(|e| e.path.as_str()).collect();
    declared
        .keys()
        .filter(|path| !local_paths.contains(path.as_str()))
        .count()
}

/// The local entries whose payload must be transmitted.
#[derive(Debug)]
pub struct UploadPlan<'a> {
    pub uploads: Vec<&'a LocalEntry>,
    pub skipped: Vec<&'a LocalEntry>,
}

impl<'a> UploadPlan<'a> {
    /// Picks, in local order, one entry per required hash. Entries sharing a
    /// hash with an already picked entry are skipped since uploads are keyed
    /// by hash.
    ///
    /// Fails if the backend requires a hash no local entry can provide.
    pub fn new(local: &'a [LocalEntry], required: &UploadRequiredSet) -> DeployResult<Self> {
        let mut seen = HashSet::new();
        let mut uploads = Vec::new();
        let mut skipped = Vec::new();
        for entry in local {
            if required.contains(&entry.hash) && seen.insert(entry.hash.as_str()) {
                uploads.push(entry);
            } else {
                skipped.push(entry);
            }
        }

        if let Some(missing) = required.iter().find(|h| !seen.contains(h.as_str())) {
            return Err(DeployError::InvalidResponse {
                step: "populateFiles",
                message: format!("upload of {} requested but no local file has it", missing),
            });
        }

        Ok(Self { uploads, skipped })
    }

    pub fn upload_bytes(&self) -> usize {
        self.uploads.iter().map(|e| e.payload.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn local(path: &str, hash: &str) -> LocalEntry {
        LocalEntry {
            path: path.to_string(),
            hash: hash.to_string(),
            payload: hash.as_bytes().to_vec(),
        }
    }

    fn remote(path: &str, hash: &str) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            hash: hash.to_string(),
        }
    }

    fn declared(pairs: &[(&str, &str)]) -> DeclaredFileSet {
        pairs
            .iter()
            .map(|(p, h)| (p.to_string(), h.to_string()))
            .collect()
    }

    fn required(hashes: &[&str]) -> UploadRequiredSet {
        hashes.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn fresh_site() {
        let l = vec![local("/a.html", "h1")];
        assert_eq!(diff(&l, &[]), declared(&[("/a.html", "h1")]));

        let plan = UploadPlan::new(&l, &required(&["h1"])).unwrap();
        assert_eq!(plan.uploads.len(), 1);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn local_overrides_remote() {
        let l = vec![local("/a.html", "h1")];
        let r = vec![remote("/a.html", "h0")];
        assert_eq!(diff(&l, &r), declared(&[("/a.html", "h1")]));

        let plan = UploadPlan::new(&l, &required(&[])).unwrap();
        assert!(plan.uploads.is_empty());
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn empty_local_keeps_remote() {
        let r = vec![remote("/b.html", "h2")];
        assert_eq!(diff(&[], &r), declared(&[("/b.html", "h2")]));
        assert!(UploadPlan::new(&[], &required(&[])).unwrap().uploads.is_empty());
    }

    #[test]
    fn mixed_merge() {
        let l = vec![local("/x", "hx"), local("/y", "hy")];
        let r = vec![remote("/y", "hy-old"), remote("/z", "hz")];
        assert_eq!(
            diff(&l, &r),
            declared(&[("/x", "hx"), ("/y", "hy"), ("/z", "hz")])
        );
    }

    #[test]
    fn later_local_entry_wins() {
        let l = vec![local("/a", "first"), local("/a", "second")];
        assert_eq!(diff(&l, &[]), declared(&[("/a", "second")]));
    }

    #[test]
    fn carried_over_counts_remote_only_paths() {
        let l = vec![local("/a", "1"), local("/a", "2"), local("/b", "3")];
        let r = vec![remote("/b", "old"), remote("/c", "4")];
        let merged = diff(&l, &r);
        assert_eq!(merged.len(), 3);
        assert_eq!(carried_over(&merged, &l), 1);
        assert_eq!(carried_over(&diff(&[], &r), &[]), 2);
    }

    #[test]
    fn duplicate_hash_uploaded_once() {
        let l = vec![local("/a", "same"), local("/b", "same"), local("/c", "other")];
        let plan = UploadPlan::new(&l, &required(&["same"])).unwrap();
        assert_eq!(plan.uploads.len(), 1);
        assert_eq!(plan.uploads[0].path, "/a");
        assert_eq!(plan.skipped.len(), 2);
        assert_eq!(plan.upload_bytes(), 4);
    }

    #[test]
    fn unknown_required_hash_is_rejected() {
        let l = vec![local("/a", "h1")];
        let err = UploadPlan::new(&l, &required(&["h1", "remote-only"])).unwrap_err();
        assert!(matches!(err, DeployError::InvalidResponse { .. }));
    }

    fn entries() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("/[a-e]", "h[0-9]"), 0..12)
    }

    proptest! {
        #[test]
        fn merge_properties(l in entries(), r in entries()) {
            let local: Vec<_> = l.iter().map(|(p, h)| local(p, h)).collect();
            let remote: Vec<_> = r.iter().map(|(p, h)| remote(p, h)).collect();
            let merged = diff(&local, &remote);

            let paths: BTreeSet<_> = l.iter().chain(r.iter()).map(|(p, _)| p.clone()).collect();
            prop_assert_eq!(merged.len(), paths.len());

            for (path, hash) in &merged {
                match local.iter().rev().find(|e| &e.path == path) {
                    Some(entry) => prop_assert_eq!(hash, &entry.hash),
                    None => {
                        let entry = remote.iter().find(|e| &e.path == path).unwrap();
                        prop_assert_eq!(hash, &entry.hash);
                    }
                }
            }

            prop_assert_eq!(&merged, &diff(&local, &remote));
        }

        #[test]
        fn uploads_only_local_hashes(l in entries(), picks in prop::collection::vec(any::<bool>(), 12)) {
            let local: Vec<_> = l.iter().map(|(p, h)| local(p, h)).collect();
            let required: UploadRequiredSet = local
                .iter()
                .zip(picks.iter())
                .filter(|(_, pick)| **pick)
                .map(|(e, _)| e.hash.clone())
                .collect();

            let plan = UploadPlan::new(&local, &required).unwrap();
            let uploaded: UploadRequiredSet = plan.uploads.iter().map(|e| e.hash.clone()).collect();
            prop_assert_eq!(&uploaded, &required);
            prop_assert_eq!(plan.uploads.len(), required.len());
            prop_assert_eq!(plan.uploads.len() + plan.skipped.len(), local.len());
        }
    }
}
