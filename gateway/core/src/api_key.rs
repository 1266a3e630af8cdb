use chrono::{offset::Utc, DateTime};

/// A decoded, cluster-scoped `ApiKey`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiKey {
    pub name: String,
    pub revisions: Vec<Revision>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    /// Encrypted secret, as produced by [`crate::DecryptionKey::encrypt`].
    pub data: Vec<u8>,
    pub status: RevisionStatus,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RevisionStatus {
    Active,
    Inactive,
}

impl ApiKey {
    /// Selects the revision used to authenticate requests.
    ///
    /// When several revisions are active, the most recently used one is selected; revisions that
    /// have never been used sort last, and remaining ties go to the earliest declared revision.
    pub fn active_revision(&self) -> Option<(usize, &Revision)> {
        self.revisions
            .iter()
            .enumerate()
            .filter(|(_, rev)| rev.status == RevisionStatus::Active)
            .fold(None, |best, (idx, rev)| match best {
                Some((_, b)) if rev.last_used <= b.last_used => best,
                _ => Some((idx, rev)),
            })
    }

    /// Records a successful use of the revision holding `data`. Returns false if no revision
    /// holds it, e.g. because the key was rotated since it was read.
    pub fn touch(&mut self, data: &[u8], at: DateTime<Utc>) -> bool {
        let mut touched = false;
        for rev in self.revisions.iter_mut().filter(|rev| rev.data == data) {
            rev.last_used = Some(at);
            touched = true;
        }
        touched
    }

    /// Carries usage timestamps recorded by the gateway over to an updated copy of the key when
    /// they are newer than what the cluster reports. Revisions are matched by their data.
    pub fn retain_usage(&mut self, previous: &ApiKey) {
        for rev in self.revisions.iter_mut() {
            let recorded = previous
                .revisions
                .iter()
                .filter(|prev| prev.data == rev.data)
                .filter_map(|prev| prev.last_used)
                .max();
            if recorded > rev.last_used {
                rev.last_used = recorded;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rev(data: &[u8], status: RevisionStatus, last_used: Option<i64>) -> Revision {
        Revision {
            data: data.to_vec(),
            status,
            last_used: last_used.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn no_active_revision() {
        let key = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![rev(b"a", RevisionStatus::Inactive, Some(10))],
        };
        assert!(key.active_revision().is_none());
    }

    #[test]
    fn most_recently_used_active_revision_wins() {
        let key = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![
                rev(b"a", RevisionStatus::Active, None),
                rev(b"b", RevisionStatus::Active, Some(20)),
                rev(b"c", RevisionStatus::Inactive, Some(30)),
                rev(b"d", RevisionStatus::Active, Some(10)),
            ],
        };
        let (idx, _) = key.active_revision().expect("must have an active revision");
        assert_eq!(idx, 1);
    }

    #[test]
    fn unused_ties_go_to_first_declared() {
        let key = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![
                rev(b"a", RevisionStatus::Inactive, None),
                rev(b"b", RevisionStatus::Active, None),
                rev(b"c", RevisionStatus::Active, None),
            ],
        };
        let (idx, _) = key.active_revision().expect("must have an active revision");
        assert_eq!(idx, 1);
    }

    #[test]
    fn touches_revisions_by_data() {
        let mut key = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![
                rev(b"a", RevisionStatus::Inactive, None),
                rev(b"b", RevisionStatus::Active, None),
            ],
        };
        let at = Utc.timestamp_opt(50, 0).unwrap();
        assert!(key.touch(b"b", at));
        assert_eq!(key.revisions[0].last_used, None);
        assert_eq!(key.revisions[1].last_used, Some(at));
        assert!(!key.touch(b"z", at), "unknown revisions are not recorded");
    }

    #[test]
    fn retains_newer_local_usage() {
        let mut previous = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![rev(b"a", RevisionStatus::Active, None)],
        };
        assert!(previous.touch(b"a", Utc.timestamp_opt(50, 0).unwrap()));

        let mut updated = ApiKey {
            name: "key-0".to_string(),
            revisions: vec![
                rev(b"a", RevisionStatus::Active, Some(40)),
                rev(b"b", RevisionStatus::Inactive, Some(60)),
            ],
        };
        updated.retain_usage(&previous);
        assert_eq!(
            updated.revisions[0].last_used,
            Some(Utc.timestamp_opt(50, 0).unwrap())
        );
        assert_eq!(
            updated.revisions[1].last_used,
            Some(Utc.timestamp_opt(60, 0).unwrap())
        );
    }
}
