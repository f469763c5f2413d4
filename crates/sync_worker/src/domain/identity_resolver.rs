use common::domain::{DomainResult, Personnel, PersonnelDirectory, ResolvedIdentity};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Resolution result per distinct employee code
pub type IdentityMap = HashMap<String, ResolvedIdentity>;

/// Maps device employee codes to personnel with one directory query per batch
pub struct IdentityResolver {
    directory: Arc<dyn PersonnelDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn PersonnelDirectory>) -> Self {
        Self { directory }
    }

    /// Every input code gets an entry. Codes with no match or more than one
    /// match resolve to an unmapped identity.
    #[instrument(skip(self, codes), fields(code_count = codes.len()))]
    pub async fn resolve_batch(&self, codes: &[String]) -> DomainResult<IdentityMap> {
        let mut distinct: Vec<String> = codes.to_vec();
        distinct.sort();
        distinct.dedup();

        if distinct.is_empty() {
            return Ok(IdentityMap::new());
        }

        let personnel = self.directory.find_by_device_codes(&distinct).await?;

        let mut matches: HashMap<&str, Vec<&Personnel>> = HashMap::new();
        for person in &personnel {
            matches
                .entry(person.attendance_device_code.as_str())
                .or_default()
                .push(person);
        }

        let mut resolved = IdentityMap::with_capacity(distinct.len());
        for code in distinct {
            let identity = match matches.get(code.as_str()).map(Vec::as_slice) {
                Some([person]) => ResolvedIdentity {
                    employee_code: code.clone(),
                    personnel_id: Some(person.personnel_id.clone()),
                },
                Some(candidates) => {
                    warn!(
                        employee_code = %code,
                        candidates = candidates.len(),
                        "Employee code matches more than one personnel record, treating as unmapped"
                    );
                    ResolvedIdentity::unmapped(code.clone())
                }
                None => ResolvedIdentity::unmapped(code.clone()),
            };
            resolved.insert(code, identity);
        }

        debug!(
            mapped = resolved.values().filter(|i| i.is_mapped()).count(),
            total = resolved.len(),
            "Resolved employee codes"
        );
        Ok(resolved)
    }
}
