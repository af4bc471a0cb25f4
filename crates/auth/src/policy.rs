//! Policy gate: rule-table authorization over (subject, tenant, resource, action).
//!
//! ## Rule table format
//!
//! One rule per line, comma-separated, `#` starts a comment:
//!
//! ```text
//! p, <subject>, <tenant>, <resource>, <action>[, allow|deny]
//! g, <user-or-role>, <role>[, <tenant>]
//! ```
//!
//! ## Semantics
//!
//! - `p` rules are evaluated in file order and the **first match wins**
//! - no matching rule means **deny**
//! - a `p` subject matches the requesting user id, or any role the user holds
//!   in the requested tenant through `g` grants (roles may inherit roles)
//! - every field is a [`Pattern`](crate::pattern::Pattern)
//!
//! The request fields must come from verified identity, never from the
//! request body or client headers.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use tenantnotes_core::{OrganizationId, UserId};

use crate::pattern::{Pattern, PatternKind};

/// Maximum role inheritance depth before evaluation gives up.
pub const MAX_ROLE_DEPTH: usize = 10;

/// Authorization question for one request.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub subject: &'a UserId,
    pub tenant: &'a OrganizationId,
    pub resource: &'a str,
    pub action: &'a str,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Index (in `p` rule order) of the deciding rule; `None` means default-deny.
    pub matched_rule: Option<usize>,
}

impl PolicyDecision {
    pub fn default_deny() -> Self {
        Self {
            allowed: false,
            matched_rule: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub subject: Pattern,
    pub tenant: Pattern,
    pub resource: Pattern,
    pub action: Pattern,
    pub effect: Effect,
}

impl PolicyRule {
    /// Build a rule from raw patterns.
    pub fn new(
        subject: &str,
        tenant: &str,
        resource: &str,
        action: &str,
        effect: Effect,
    ) -> Result<Self, PolicyLoadError> {
        Ok(Self {
            subject: compile(subject, PatternKind::Plain, 0, "subject")?,
            tenant: compile(tenant, PatternKind::Plain, 0, "tenant")?,
            resource: compile(resource, PatternKind::Path, 0, "resource")?,
            action: compile(action, PatternKind::Method, 0, "action")?,
            effect,
        })
    }
}

/// `g` line: `member` holds `role` in tenants matching `tenant`.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub member: String,
    pub role: String,
    pub tenant: Pattern,
}

/// Error raised when the rule table text cannot be loaded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("policy line {line}: {message}")]
pub struct PolicyLoadError {
    pub line: usize,
    pub message: String,
}

impl PolicyLoadError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Policy evaluation failure (distinct from a deny decision).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyEvaluationError {
    #[error("role hierarchy for subject '{subject}' exceeds depth {max_depth}")]
    RoleHierarchyTooDeep { subject: String, max_depth: usize },

    #[error("policy source unavailable: {0}")]
    Unavailable(String),
}

/// Parsed rule table.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
    grants: Vec<RoleGrant>,
}

impl PolicyTable {
    pub fn new(rules: Vec<PolicyRule>, grants: Vec<RoleGrant>) -> Self {
        Self { rules, grants }
    }

    /// Parse the line-oriented rule table format.
    pub fn parse(text: &str) -> Result<Self, PolicyLoadError> {
        let mut table = Self::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields[0] {
                "p" => table.rules.push(parse_rule(&fields[1..], line_no)?),
                "g" => table.grants.push(parse_grant(&fields[1..], line_no)?),
                other => {
                    return Err(PolicyLoadError::at(
                        line_no,
                        format!("unknown rule type '{other}' (expected 'p' or 'g')"),
                    ));
                }
            }
        }

        Ok(table)
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn grants(&self) -> &[RoleGrant] {
        &self.grants
    }

    /// Evaluate a request: first matching `p` rule wins, default deny.
    pub fn evaluate(&self, req: &AccessRequest<'_>) -> Result<PolicyDecision, PolicyEvaluationError> {
        let roles = self.roles_for(req.subject, req.tenant)?;

        for (idx, rule) in self.rules.iter().enumerate() {
            let subject_matches = rule.subject.matches(req.subject.as_str())
                || roles.iter().any(|r| rule.subject.matches(r));

            if subject_matches
                && rule.tenant.matches(req.tenant.as_str())
                && rule.resource.matches(req.resource)
                && rule.action.matches(req.action)
            {
                return Ok(PolicyDecision {
                    allowed: rule.effect == Effect::Allow,
                    matched_rule: Some(idx),
                });
            }
        }

        Ok(PolicyDecision::default_deny())
    }

    /// Transitively resolve the roles a user holds within `tenant`.
    fn roles_for(
        &self,
        user: &UserId,
        tenant: &OrganizationId,
    ) -> Result<BTreeSet<String>, PolicyEvaluationError> {
        let mut held: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = vec![user.as_str().to_string()];

        for _ in 0..MAX_ROLE_DEPTH {
            let mut next = Vec::new();
            for member in &frontier {
                for grant in &self.grants {
                    if &grant.member == member
                        && grant.tenant.matches(tenant.as_str())
                        && held.insert(grant.role.clone())
                    {
                        next.push(grant.role.clone());
                    }
                }
            }
            if next.is_empty() {
                return Ok(held);
            }
            frontier = next;
        }

        // One more step only to detect whether the chain keeps growing.
        let grows = frontier.iter().any(|member| {
            self.grants.iter().any(|g| {
                &g.member == member && g.tenant.matches(tenant.as_str()) && !held.contains(&g.role)
            })
        });
        if grows {
            return Err(PolicyEvaluationError::RoleHierarchyTooDeep {
                subject: user.to_string(),
                max_depth: MAX_ROLE_DEPTH,
            });
        }
        Ok(held)
    }
}

fn compile(raw: &str, kind: PatternKind, line: usize, field: &str) -> Result<Pattern, PolicyLoadError> {
    Pattern::compile(raw, kind).ok_or_else(|| PolicyLoadError::at(line, format!("empty {field} pattern")))
}

fn parse_rule(fields: &[&str], line: usize) -> Result<PolicyRule, PolicyLoadError> {
    if fields.len() != 4 && fields.len() != 5 {
        return Err(PolicyLoadError::at(
            line,
            format!("'p' rule needs 4 or 5 fields, got {}", fields.len()),
        ));
    }

    let effect = match fields.get(4).map(|s| s.to_ascii_lowercase()) {
        None => Effect::Allow,
        Some(e) if e == "allow" => Effect::Allow,
        Some(e) if e == "deny" => Effect::Deny,
        Some(other) => {
            return Err(PolicyLoadError::at(line, format!("unknown effect '{other}'")));
        }
    };

    Ok(PolicyRule {
        subject: compile(fields[0], PatternKind::Plain, line, "subject")?,
        tenant: compile(fields[1], PatternKind::Plain, line, "tenant")?,
        resource: compile(fields[2], PatternKind::Path, line, "resource")?,
        action: compile(fields[3], PatternKind::Method, line, "action")?,
        effect,
    })
}

fn parse_grant(fields: &[&str], line: usize) -> Result<RoleGrant, PolicyLoadError> {
    if fields.len() != 2 && fields.len() != 3 {
        return Err(PolicyLoadError::at(
            line,
            format!("'g' rule needs 2 or 3 fields, got {}", fields.len()),
        ));
    }
    if fields[0].is_empty() || fields[1].is_empty() {
        return Err(PolicyLoadError::at(line, "'g' rule member and role must not be empty"));
    }

    Ok(RoleGrant {
        member: fields[0].to_string(),
        role: fields[1].to_string(),
        tenant: compile(fields.get(2).copied().unwrap_or("*"), PatternKind::Plain, line, "tenant")?,
    })
}

/// Authorization gate consulted for every protected request.
pub trait PolicyGate: Send + Sync {
    fn enforce(&self, req: &AccessRequest<'_>) -> Result<PolicyDecision, PolicyEvaluationError>;
}

impl<G> PolicyGate for Arc<G>
where
    G: PolicyGate + ?Sized,
{
    fn enforce(&self, req: &AccessRequest<'_>) -> Result<PolicyDecision, PolicyEvaluationError> {
        (**self).enforce(req)
    }
}

/// Gate backed by an immutable, startup-loaded [`PolicyTable`].
#[derive(Debug, Clone)]
pub struct RuleTablePolicy {
    table: PolicyTable,
}

impl RuleTablePolicy {
    pub fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }
}

impl PolicyGate for RuleTablePolicy {
    fn enforce(&self, req: &AccessRequest<'_>) -> Result<PolicyDecision, PolicyEvaluationError> {
        let decision = self.table.evaluate(req)?;
        tracing::debug!(
            user_id = %req.subject,
            organization_id = %req.tenant,
            resource = req.resource,
            action = req.action,
            allowed = decision.allowed,
            matched_rule = ?decision.matched_rule,
            "policy evaluated"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn org(s: &str) -> OrganizationId {
        OrganizationId::new(s).unwrap()
    }

    fn decide(table: &PolicyTable, u: &str, o: &str, path: &str, method: &str) -> PolicyDecision {
        let (u, o) = (user(u), org(o));
        table
            .evaluate(&AccessRequest {
                subject: &u,
                tenant: &o,
                resource: path,
                action: method,
            })
            .unwrap()
    }

    #[test]
    fn empty_table_denies_by_default() {
        let table = PolicyTable::parse("").unwrap();
        assert_eq!(decide(&table, "u1", "orgA", "/api/notes", "GET"), PolicyDecision::default_deny());
    }

    #[test]
    fn first_match_wins() {
        let table = PolicyTable::parse(
            "p, u2, orgA, /api/notes, POST, deny\n\
             p, *, orgA, /api/notes, GET|POST\n",
        )
        .unwrap();

        let d = decide(&table, "u2", "orgA", "/api/notes", "POST");
        assert!(!d.allowed);
        assert_eq!(d.matched_rule, Some(0));

        let d = decide(&table, "u1", "orgA", "/api/notes", "POST");
        assert!(d.allowed);
        assert_eq!(d.matched_rule, Some(1));
    }

    #[test]
    fn tenant_pattern_restricts_rule() {
        let table = PolicyTable::parse("p, *, orgA, /api/notes*, GET").unwrap();
        assert!(decide(&table, "u1", "orgA", "/api/notes/3", "GET").allowed);
        assert!(!decide(&table, "u1", "orgB", "/api/notes/3", "GET").allowed);
    }

    #[test]
    fn role_grants_are_tenant_scoped() {
        let table = PolicyTable::parse(
            "p, editor, *, /api/notes, POST\n\
             g, alice, editor, orgA\n",
        )
        .unwrap();

        assert!(decide(&table, "alice", "orgA", "/api/notes", "POST").allowed);
        assert!(!decide(&table, "alice", "orgB", "/api/notes", "POST").allowed);
        assert!(!decide(&table, "bob", "orgA", "/api/notes", "POST").allowed);
    }

    #[test]
    fn roles_inherit_roles() {
        let table = PolicyTable::parse(
            "p, reader, *, /api/notes, GET\n\
             g, writer, reader\n\
             g, alice, writer, orgA\n",
        )
        .unwrap();
        assert!(decide(&table, "alice", "orgA", "/api/notes", "GET").allowed);
    }

    #[test]
    fn role_cycles_terminate() {
        let table = PolicyTable::parse(
            "p, a, *, /x, GET\n\
             g, alice, a\n\
             g, a, b\n\
             g, b, a\n",
        )
        .unwrap();
        assert!(decide(&table, "alice", "orgA", "/x", "GET").allowed);
    }

    #[test]
    fn overly_deep_hierarchy_is_an_evaluation_error() {
        let mut text = String::from("p, r0, *, /x, GET\ng, alice, r0\n");
        for i in 0..(MAX_ROLE_DEPTH + 2) {
            text.push_str(&format!("g, r{}, r{}\n", i, i + 1));
        }
        let table = PolicyTable::parse(&text).unwrap();
        let (u, o) = (user("alice"), org("orgA"));
        let err = table
            .evaluate(&AccessRequest {
                subject: &u,
                tenant: &o,
                resource: "/x",
                action: "GET",
            })
            .unwrap_err();
        assert!(matches!(err, PolicyEvaluationError::RoleHierarchyTooDeep { .. }));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let table = PolicyTable::parse("# header\n\n  p, *, *, /api/notes, GET  # trailing\n").unwrap();
        assert_eq!(table.rules().len(), 1);
    }

    #[test]
    fn malformed_lines_report_line_numbers() {
        let err = PolicyTable::parse("p, *, *, /a, GET\nx, y").unwrap_err();
        assert_eq!(err.line, 2);

        let err = PolicyTable::parse("p, *, *, /a").unwrap_err();
        assert_eq!(err.line, 1);

        let err = PolicyTable::parse("p, *, *, /a, GET, maybe").unwrap_err();
        assert!(err.message.contains("maybe"));

        let err = PolicyTable::parse("p, *, , /a, GET").unwrap_err();
        assert!(err.message.contains("tenant"));
    }

    #[test]
    fn arc_wrapped_gate_delegates() {
        let gate: Arc<dyn PolicyGate> = Arc::new(RuleTablePolicy::new(
            PolicyTable::parse("p, *, *, /api/notes/:id, GET").unwrap(),
        ));
        let (u, o) = (user("u1"), org("orgA"));
        let d = gate
            .enforce(&AccessRequest {
                subject: &u,
                tenant: &o,
                resource: "/api/notes/12",
                action: "GET",
            })
            .unwrap();
        assert!(d.allowed);
    }
}
