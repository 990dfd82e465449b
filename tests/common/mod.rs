//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use git2::{IndexAddOption, Repository, Signature, Time};
use tempfile::TempDir;

use gevol::meta::{EventKind, EventState, IssueEvent, MetaResult, MetaSource, RepoIdentity};
use gevol::scanner::Commit;

/// Temporary repository whose commits carry chosen timestamps
pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repo = Repository::init(dir.path()).expect("Failed to init repository");
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `files` and commit the whole tree at `secs` (UTC)
    pub fn commit(&self, files: &[(&str, &str)], secs: i64) -> Commit {
        for (relative, content) in files {
            let path = self.path().join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create parent dir");
            }
            fs::write(&path, content).expect("Failed to write file");
        }

        let mut index = self.repo.index().expect("Failed to open index");
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).expect("Failed to stage files");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let signature = Signature::new("Test User", "test@example.com", &Time::new(secs, 0))
            .expect("Failed to build signature");
        let parent = self.repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self.repo
            .commit(Some("HEAD"), &signature, &signature, &format!("commit at {secs}"), &tree, &parents)
            .expect("Failed to commit");

        let timestamp = at_secs(secs).with_timezone(&FixedOffset::east_opt(0).unwrap());
        Commit::new(oid.to_string(), timestamp)
    }
}

pub fn at_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn issue(number: u64, created_secs: i64, state: EventState) -> IssueEvent {
    IssueEvent {
        number,
        kind: EventKind::Issue,
        state,
        created_at: at_secs(created_secs),
        closed_at: (!state.is_open()).then(|| at_secs(created_secs + 1)),
    }
}

pub fn pull_request(number: u64, created_secs: i64, state: EventState) -> IssueEvent {
    IssueEvent {
        kind: EventKind::PullRequest,
        ..issue(number, created_secs, state)
    }
}

/// Meta source returning a fixed event list
pub struct FixedEvents(pub Vec<IssueEvent>);

#[async_trait]
impl MetaSource for FixedEvents {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_events(&self, _repo: &RepoIdentity) -> MetaResult<Vec<IssueEvent>> {
        Ok(self.0.clone())
    }
}
