//! Tenant scope resolution.
//!
//! Every authorization decision downstream of login is made against a
//! [`TenantScope`]: the caller's effective role level and the company/branch
//! that level applies to. The scope is recomputed from role assignments on
//! every request, so promotions, demotions and reassignments take effect on the
//! very next call.
//!
//! # Primary assignment
//!
//! A user may hold several assignments (multi-company access). The primary one
//! is the assignment with the highest role level; among equal levels the one
//! with the lowest assignment id (the oldest grant) wins. Login orders the role
//! list the same way, so index 0 of a session's roles is the primary role.

use crate::database::models::{RoleAssignment, RoleLevel};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::IdentityStore;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// Effective authorization scope of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    pub role_level: RoleLevel,
    pub company_id: Option<String>,
    pub branch_id: Option<String>,
}

/// Row filter a query must apply for a given scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScopeFilter {
    /// No restriction.
    Global,
    #[serde(rename_all = "camelCase")]
    Company { company_id: String },
    #[serde(rename_all = "camelCase")]
    Branch { company_id: String, branch_id: String },
}

impl TenantScope {
    pub fn from_assignment(assignment: &RoleAssignment) -> Self {
        Self {
            role_level: assignment.level,
            company_id: assignment.company_id.clone(),
            branch_id: assignment.branch_id.clone(),
        }
    }

    pub fn filter(&self) -> ScopeFilter {
        if self.role_level.is_platform() {
            return ScopeFilter::Global;
        }
        match (&self.company_id, &self.branch_id) {
            (Some(company_id), Some(branch_id)) if !self.role_level.is_company() => {
                ScopeFilter::Branch {
                    company_id: company_id.clone(),
                    branch_id: branch_id.clone(),
                }
            }
            (Some(company_id), _) => ScopeFilter::Company {
                company_id: company_id.clone(),
            },
            // Unreachable for assignments that passed the consistency check;
            // treat as the narrowest possible scope.
            (None, _) => ScopeFilter::Branch {
                company_id: String::new(),
                branch_id: String::new(),
            },
        }
    }

    /// Whether a row owned by `company_id`/`branch_id` is visible.
    pub fn can_access(&self, company_id: Option<&str>, branch_id: Option<&str>) -> bool {
        match self.filter() {
            ScopeFilter::Global => true,
            ScopeFilter::Company { company_id: own } => company_id == Some(own.as_str()),
            ScopeFilter::Branch {
                company_id: own_company,
                branch_id: own_branch,
            } => company_id == Some(own_company.as_str()) && branch_id == Some(own_branch.as_str()),
        }
    }

    pub fn require_level(&self, min: RoleLevel) -> ServiceResult<()> {
        if self.role_level < min {
            return Err(ServiceError::forbidden(format!(
                "Role level {} or higher required",
                min
            )));
        }
        Ok(())
    }
}

/// Privilege order: higher level first, then lower assignment id.
fn privilege_order(a: &RoleAssignment, b: &RoleAssignment) -> Ordering {
    b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id))
}

/// Sorts assignments most privileged first.
pub fn sort_by_privilege(assignments: &mut [RoleAssignment]) {
    assignments.sort_by(privilege_order);
}

/// Selects the primary assignment (see module docs).
pub fn primary_assignment(assignments: &[RoleAssignment]) -> Option<&RoleAssignment> {
    assignments.iter().min_by(|a, b| privilege_order(a, b))
}

/// Drops assignments whose scope contradicts their level.
pub fn usable_assignments(assignments: Vec<RoleAssignment>) -> Vec<RoleAssignment> {
    assignments
        .into_iter()
        .filter(|assignment| {
            let consistent = assignment.has_consistent_scope();
            if !consistent {
                tracing::warn!(
                    "Ignoring role assignment {} for user {}: level {} with company {:?} branch {:?}",
                    assignment.id,
                    assignment.user_id,
                    assignment.level,
                    assignment.company_id,
                    assignment.branch_id
                );
            }
            consistent
        })
        .collect()
}

/// Resolves a user id to its current [`TenantScope`].
#[derive(Clone)]
pub struct TenantScopeResolver {
    identities: Arc<dyn IdentityStore>,
}

impl TenantScopeResolver {
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }

    /// Reads the user's assignments and projects the primary one.
    ///
    /// # Errors
    /// `Forbidden` when the user has no usable assignment, `Database` on
    /// storage failure.
    pub async fn resolve(&self, user_id: &str) -> ServiceResult<TenantScope> {
        let assignments = usable_assignments(self.identities.role_assignments(user_id).await?);

        primary_assignment(&assignments)
            .map(TenantScope::from_assignment)
            .ok_or_else(|| ServiceError::forbidden("No role assigned"))
    }
}
