//! Access resolver: decides whether an identifier falls inside the approved
//! subtree of the workspace.
//!
//! A page is reachable when it is approved directly or is a descendant of an
//! approved page, discovered by walking `parent_of` upward. Every uncertainty
//! (unknown parent kind, upstream failure, depth exhausted, cycle) resolves
//! to a denial.

use crate::db::Database;
use crate::models::AccessLevel;
use crate::services::notion::{DocumentStore, ParentRef, SearchHit};
use crate::services::ServiceError;
use crate::utils::notion_url::extract_notion_id;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Ancestry walks stop after this many parent hops.
const MAX_PARENT_DEPTH: usize = 10;

/// A positive access decision.
#[derive(Debug, Clone)]
pub struct PageAccess {
    /// Canonical (dash-stripped) id the check resolved to.
    pub page_id: String,
    pub access_level: AccessLevel,
    /// Approved ancestor the decision came from. Equal to `page_id` for a
    /// direct grant.
    pub granted_via: String,
}

#[derive(Clone)]
pub struct AccessResolver {
    db: Arc<Database>,
    store: Arc<dyn DocumentStore>,
}

impl AccessResolver {
    pub fn new(db: Arc<Database>, store: Arc<dyn DocumentStore>) -> Self {
        Self { db, store }
    }

    /// Resolve `input` (URL, dashed, or bare id) and decide access.
    /// `require_write` additionally demands a read-write grant.
    #[instrument(skip(self))]
    pub async fn check_access(
        &self,
        input: &str,
        require_write: bool,
    ) -> Result<PageAccess, ServiceError> {
        let page_id = extract_notion_id(input).ok_or(ServiceError::UnresolvableIdentifier)?;
        let approved = self.approved_map().await?;

        let granted_via = match self.resolve(&page_id, &approved).await {
            Some(root) => root,
            None => return Err(ServiceError::NotApproved),
        };

        // Unwrap is safe: resolve only returns keys of `approved`.
        let access_level = approved[&granted_via];
        if require_write && access_level != AccessLevel::ReadWrite {
            return Err(ServiceError::WriteNotPermitted);
        }

        Ok(PageAccess {
            page_id,
            access_level,
            granted_via,
        })
    }

    /// Drop search hits outside the approved subtree. Hits whose canonical
    /// id is approved directly skip the parent walk entirely, and ancestry
    /// results are memoized across hits so shared subtrees are walked once.
    #[instrument(skip(self, hits), fields(hits = hits.len()))]
    pub async fn filter_approved(&self, hits: Vec<SearchHit>) -> Result<Vec<SearchHit>, ServiceError> {
        let approved = self.approved_map().await?;
        let mut memo: HashMap<String, bool> = HashMap::new();
        let mut kept = Vec::new();

        for hit in hits {
            let Some(id) = extract_notion_id(&hit.id) else {
                continue;
            };
            if approved.contains_key(&id) {
                kept.push(hit);
                continue;
            }
            let allowed = match memo.get(&id) {
                Some(&cached) => cached,
                None => {
                    let allowed = self.resolve(&id, &approved).await.is_some();
                    memo.insert(id, allowed);
                    allowed
                }
            };
            if allowed {
                kept.push(hit);
            }
        }

        Ok(kept)
    }

    async fn approved_map(&self) -> Result<HashMap<String, AccessLevel>, ServiceError> {
        let pages = self.db.list_approved_pages().await?;
        Ok(pages
            .into_iter()
            .map(|p| (p.notion_page_id, p.access_level))
            .collect())
    }

    /// Walk upward from `page_id` until an approved ancestor, the workspace
    /// root, a cycle, a lookup failure, or the depth cap. Returns the
    /// approved id the walk landed on, if any.
    async fn resolve(
        &self,
        page_id: &str,
        approved: &HashMap<String, AccessLevel>,
    ) -> Option<String> {
        if approved.contains_key(page_id) {
            return Some(page_id.to_string());
        }

        let mut current = page_id.to_string();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(current.clone());

        for _ in 0..MAX_PARENT_DEPTH {
            let parent = match self.store.parent_of(&current).await {
                Ok(parent) => parent,
                Err(e) => {
                    warn!(page_id = %current, error = %e, "Parent lookup failed; denying");
                    return None;
                }
            };

            let parent_id = match parent {
                ParentRef::Page(id) | ParentRef::Database(id) => id,
                ParentRef::WorkspaceRoot => {
                    debug!(page_id = %page_id, "Walk reached workspace root");
                    return None;
                }
                ParentRef::Unknown => {
                    debug!(page_id = %current, "Unknown parent kind; denying");
                    return None;
                }
            };

            let canonical = extract_notion_id(&parent_id)?;
            if approved.contains_key(&canonical) {
                return Some(canonical);
            }
            if !visited.insert(canonical.clone()) {
                warn!(page_id = %page_id, "Cycle in parent chain; denying");
                return None;
            }
            current = canonical;
        }

        debug!(page_id = %page_id, depth = MAX_PARENT_DEPTH, "Walk exhausted depth budget");
        None
    }
}
