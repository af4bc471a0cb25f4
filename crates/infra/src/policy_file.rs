//! Loading the policy rule table from disk.

use std::path::Path;

use anyhow::Context;

use tenantnotes_auth::PolicyTable;

/// Read and parse the rule table. A missing or malformed file is an error;
/// the service does not start with a partial policy.
pub fn load_policy_table(path: &Path) -> anyhow::Result<PolicyTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading policy file {}", path.display()))?;
    let table = PolicyTable::parse(&text).with_context(|| format!("parsing policy file {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        rules = table.rules().len(),
        grants = table.grants().len(),
        "policy loaded"
    );
    Ok(table)
}
