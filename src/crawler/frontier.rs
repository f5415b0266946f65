//! Crawl frontier, visited sets, and link admission
//!
//! The frontier holds the tasks of the next generation. Workers never touch
//! it: each returns the children it admitted and the coordinator appends them
//! once the generation has drained. The visited sets are the only state
//! mutated concurrently; every claim is a single check-and-insert under one
//! lock.

use crate::url::{extract_authority, normalize_url, request_url};
use crate::{UrlError, UrlResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// A page to fetch, at its link distance from the seed
///
/// `url` is the link as resolved on its parent page. It is what gets
/// requested and what relative links on the page are resolved against.
/// `key` is its normalized form, the entry claimed in the visited set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: Url,
    pub key: Url,
    pub depth: u32,
}

impl CrawlTask {
    /// Builds a task from an absolute link
    pub fn new(link: &str, depth: u32) -> UrlResult<Self> {
        let key = normalize_url(link)?;
        let url = request_url(link)?;
        Ok(Self { url, key, depth })
    }
}

/// Page URLs, resource URLs, and resource names claimed during this run
#[derive(Debug, Default)]
pub struct VisitedSet {
    pages: Mutex<HashSet<String>>,
    resources: Mutex<HashSet<String>>,
    resource_names: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a normalized page URL
    ///
    /// Returns true for exactly one caller per URL, however many race.
    pub fn claim_page(&self, url: &Url) -> bool {
        lock(&self.pages).insert(url.as_str().to_string())
    }

    /// Claims a resource URL for download
    ///
    /// Returns true for exactly one caller per URL, however many race.
    pub fn claim_resource(&self, url: &str) -> bool {
        lock(&self.resources).insert(url.to_string())
    }

    /// Claims the storage name a resource will be written under
    ///
    /// Distinct URLs can map to one name; only the first may write it.
    pub fn claim_resource_name(&self, name: &str) -> bool {
        lock(&self.resource_names).insert(name.to_string())
    }

    pub fn contains_page(&self, url: &Url) -> bool {
        lock(&self.pages).contains(url.as_str())
    }

    pub fn page_count(&self) -> usize {
        lock(&self.pages).len()
    }

    pub fn resource_count(&self) -> usize {
        lock(&self.resources).len()
    }
}

/// Locks a set, recovering the data if a worker panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a discovered link was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The link could not be normalized
    Malformed,
    /// The link points at a different authority than the seed
    OffDomain,
    /// The child would exceed the maximum depth
    TooDeep,
    /// Another task already claimed this URL
    AlreadySeen,
}

/// Result of offering a discovered link to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(CrawlTask),
    Rejected(RejectReason),
}

/// Decides which discovered links become tasks
///
/// A link is admitted iff it normalizes, shares the seed's authority, stays
/// within the maximum depth, and wins the page claim. The claim is evaluated
/// last so a rejected link never occupies the visited set.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    authority: String,
    max_depth: u32,
}

impl AdmissionPolicy {
    /// Builds the policy around the seed's authority
    pub fn new(seed: &Url, max_depth: u32) -> UrlResult<Self> {
        let authority = extract_authority(seed).ok_or(UrlError::MissingDomain)?;
        Ok(Self {
            authority,
            max_depth,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Offers a link found on a page at `parent_depth`
    ///
    /// # Arguments
    ///
    /// * `link` - Absolute URL as found on the page
    /// * `parent_depth` - Depth of the page the link was found on
    /// * `visited` - The run's visited sets
    ///
    /// # Returns
    ///
    /// The admitted child task, or the first rule the link failed
    pub fn admit(&self, link: &str, parent_depth: u32, visited: &VisitedSet) -> Admission {
        let depth = parent_depth.saturating_add(1);
        let task = match CrawlTask::new(link, depth) {
            Ok(task) => task,
            Err(_) => return Admission::Rejected(RejectReason::Malformed),
        };

        if extract_authority(&task.key).as_deref() != Some(self.authority.as_str()) {
            return Admission::Rejected(RejectReason::OffDomain);
        }

        if depth > self.max_depth {
            return Admission::Rejected(RejectReason::TooDeep);
        }

        if !visited.claim_page(&task.key) {
            return Admission::Rejected(RejectReason::AlreadySeen);
        }

        Admission::Admitted(task)
    }
}

/// Pending tasks of the next generation plus the run's visited sets
#[derive(Debug, Default)]
pub struct Frontier {
    visited: Arc<VisitedSet>,
    pending: Vec<CrawlTask>,
    generation: u32,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the seed task
    ///
    /// Returns false if its key was already claimed.
    pub fn seed(&mut self, task: CrawlTask) -> bool {
        if !self.visited.claim_page(&task.key) {
            return false;
        }
        self.pending.push(task);
        true
    }

    /// Removes and returns every pending task as the next generation
    pub fn take_generation(&mut self) -> Vec<CrawlTask> {
        self.generation += 1;
        std::mem::take(&mut self.pending)
    }

    /// Appends admitted children for the following generation
    pub fn extend(&mut self, tasks: impl IntoIterator<Item = CrawlTask>) {
        self.pending.extend(tasks);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Number of generations taken so far
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn visited(&self) -> &Arc<VisitedSet> {
        &self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn policy(max_depth: u32) -> AdmissionPolicy {
        AdmissionPolicy::new(&url("https://ex.test/a"), max_depth).unwrap()
    }

    #[test]
    fn test_claim_page_once() {
        let visited = VisitedSet::new();
        assert!(visited.claim_page(&url("https://ex.test/a")));
        assert!(!visited.claim_page(&url("https://ex.test/a")));
        assert!(visited.contains_page(&url("https://ex.test/a")));
        assert_eq!(visited.page_count(), 1);
    }

    #[test]
    fn test_page_and_resource_sets_are_separate() {
        let visited = VisitedSet::new();
        assert!(visited.claim_page(&url("https://ex.test/x.png")));
        assert!(visited.claim_resource("https://ex.test/x.png"));
        assert!(!visited.claim_resource("https://ex.test/x.png"));
        assert_eq!(visited.resource_count(), 1);
    }

    #[test]
    fn test_resource_name_claimed_once() {
        let visited = VisitedSet::new();
        assert!(visited.claim_resource("https://ex.test/a/icon.png"));
        assert!(visited.claim_resource("https://ex.test/b/icon.png"));
        assert!(visited.claim_resource_name("icon.png"));
        assert!(!visited.claim_resource_name("icon.png"));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let visited = Arc::new(VisitedSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let visited = Arc::clone(&visited);
                thread::spawn(move || visited.claim_page(&url("https://ex.test/d")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_admit_same_authority_child() {
        let visited = VisitedSet::new();
        let admission = policy(1).admit("https://ex.test/b", 0, &visited);
        assert_eq!(
            admission,
            Admission::Admitted(CrawlTask {
                url: url("https://ex.test/b"),
                key: url("https://ex.test/b"),
                depth: 1
            })
        );
    }

    #[test]
    fn test_admitted_task_keeps_link_as_written() {
        let visited = VisitedSet::new();
        let task = match policy(1).admit("https://ex.test/docs/?b=2&a=1#top", 0, &visited) {
            Admission::Admitted(task) => task,
            other => panic!("unexpected admission {:?}", other),
        };

        assert_eq!(task.url.as_str(), "https://ex.test/docs/?b=2&a=1");
        assert_eq!(task.key.as_str(), "https://ex.test/docs?a=1&b=2");
        assert!(visited.contains_page(&task.key));
        assert_eq!(
            policy(1).admit("https://ex.test/docs?a=1&b=2", 0, &visited),
            Admission::Rejected(RejectReason::AlreadySeen)
        );
    }

    #[test]
    fn test_admit_normalizes_before_claiming() {
        let visited = VisitedSet::new();
        let policy = policy(2);
        assert!(matches!(
            policy.admit("https://EX.test/b/#top", 0, &visited),
            Admission::Admitted(_)
        ));
        assert_eq!(
            policy.admit("https://ex.test/b", 0, &visited),
            Admission::Rejected(RejectReason::AlreadySeen)
        );
    }

    #[test]
    fn test_reject_off_domain() {
        let visited = VisitedSet::new();
        assert_eq!(
            policy(3).admit("https://other.test/d", 0, &visited),
            Admission::Rejected(RejectReason::OffDomain)
        );
        // Subdomains and other ports are different authorities
        assert_eq!(
            policy(3).admit("https://www.ex.test/d", 0, &visited),
            Admission::Rejected(RejectReason::OffDomain)
        );
        assert_eq!(
            policy(3).admit("https://ex.test:8443/d", 0, &visited),
            Admission::Rejected(RejectReason::OffDomain)
        );
        // Rejected links do not occupy the visited set
        assert_eq!(visited.page_count(), 0);
    }

    #[test]
    fn test_reject_too_deep() {
        let visited = VisitedSet::new();
        assert_eq!(
            policy(1).admit("https://ex.test/c", 1, &visited),
            Admission::Rejected(RejectReason::TooDeep)
        );
        assert_eq!(
            policy(0).admit("https://ex.test/b", 0, &visited),
            Admission::Rejected(RejectReason::TooDeep)
        );
        assert!(!visited.contains_page(&url("https://ex.test/c")));
    }

    #[test]
    fn test_reject_malformed() {
        let visited = VisitedSet::new();
        assert_eq!(
            policy(3).admit("not a url", 0, &visited),
            Admission::Rejected(RejectReason::Malformed)
        );
        assert_eq!(
            policy(3).admit("ftp://ex.test/file", 0, &visited),
            Admission::Rejected(RejectReason::Malformed)
        );
    }

    #[test]
    fn test_seed_without_host_is_rejected() {
        assert!(AdmissionPolicy::new(&url("data:text/plain,x"), 1).is_err());
    }

    #[test]
    fn test_frontier_generations() {
        let mut frontier = Frontier::new();
        assert!(frontier.seed(CrawlTask::new("https://ex.test/a/", 0).unwrap()));
        assert!(!frontier.seed(CrawlTask::new("https://ex.test/a", 0).unwrap()));
        assert_eq!(frontier.len(), 1);

        let first = frontier.take_generation();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].depth, 0);
        assert_eq!(first[0].url.as_str(), "https://ex.test/a/");
        assert!(frontier.is_empty());
        assert_eq!(frontier.generation(), 1);

        let policy = policy(1);
        let children: Vec<_> = ["https://ex.test/b", "https://ex.test/c", "https://ex.test/a"]
            .iter()
            .filter_map(|link| match policy.admit(link, 0, frontier.visited()) {
                Admission::Admitted(task) => Some(task),
                Admission::Rejected(_) => None,
            })
            .collect();
        frontier.extend(children);

        let second = frontier.take_generation();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|t| t.depth == 1));
        assert_eq!(frontier.generation(), 2);
    }
}
