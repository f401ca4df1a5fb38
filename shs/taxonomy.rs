//! # Cause Taxonomy
//!
//! Static mapping from the health-condition labels offered to users to the
//! elementary IHME cause names stored in the fact table.
//!
//! - `All health conditions` always means the full SHS cause list.
//! - Four grouped labels stand for fixed, disjoint sets of elementary causes.
//! - Any other label is passed through untouched and used as a literal
//!   `cause_name` filter. Unknown labels simply match nothing.

pub const ALL_HEALTH_CONDITIONS: &str = "All health conditions";

/// Every cause that carries an SHS coefficient, in dropdown order.
pub const SHS_CAUSES: [&str; 27] = [
    "HIV/AIDS",
    "Drug-susceptible tuberculosis",
    "Multidrug-resistant tuberculosis without extensive drug resistance",
    "Extensively drug-resistant tuberculosis",
    "Ischemic stroke",
    "Intracerebral hemorrhage",
    "Subarachnoid hemorrhage",
    "Cirrhosis and other chronic liver diseases",
    "Liver cancer",
    "Chronic kidney disease",
    "Acute glomerulonephritis",
    "Alzheimer's disease and other dementias",
    "Chronic obstructive pulmonary disease",
    "Congenital birth defects",
    "Neonatal preterm birth",
    "Neonatal encephalopathy due to birth asphyxia and trauma",
    "Sickle cell disorders",
    "Thalassemias",
    "Protein-energy malnutrition",
    "Rheumatoid arthritis",
    "Parkinson's disease",
    "Multiple sclerosis",
    "Meningitis",
    "Ebola",
    "Non-rheumatic valvular heart disease",
    "Leukemia",
    "Tracheal, bronchus, and lung cancer",
];

/// A display label standing for several elementary causes.
#[derive(Debug, Clone, Copy)]
pub struct CauseGroup {
    pub label: &'static str,
    pub causes: &'static [&'static str],
}

pub static CAUSE_GROUPS: [CauseGroup; 4] = [
    CauseGroup {
        label: "Stroke",
        causes: &[
            "Ischemic stroke",
            "Intracerebral hemorrhage",
            "Subarachnoid hemorrhage",
        ],
    },
    CauseGroup {
        label: "Liver diseases",
        causes: &["Cirrhosis and other chronic liver diseases", "Liver cancer"],
    },
    CauseGroup {
        label: "Tuberculosis",
        causes: &[
            "Drug-susceptible tuberculosis",
            "Multidrug-resistant tuberculosis without extensive drug resistance",
            "Extensively drug-resistant tuberculosis",
        ],
    },
    CauseGroup {
        label: "Kidney diseases",
        causes: &["Chronic kidney disease", "Acute glomerulonephritis"],
    },
];

/// Expands a health-condition label into the elementary causes it selects.
///
/// The SHS flag does not change the expansion: the aggregate label is the SHS
/// list in both modes. Callers in SHS mode drop ineligible causes themselves.
pub fn expand(label: &str, shs_mode: bool) -> Vec<String> {
    if label == ALL_HEALTH_CONDITIONS {
        log::debug!("Expanding '{label}' to {} causes (shs={shs_mode})", SHS_CAUSES.len());
        return SHS_CAUSES.iter().map(|cause| cause.to_string()).collect();
    }

    match group(label) {
        Some(group) => group.causes.iter().map(|cause| cause.to_string()).collect(),
        None => vec![label.to_string()],
    }
}

pub fn group(label: &str) -> Option<&'static CauseGroup> {
    CAUSE_GROUPS.iter().find(|group| group.label == label)
}

pub fn is_shs_eligible(cause: &str) -> bool {
    SHS_CAUSES.contains(&cause)
}

/// The labels offered in the health-condition dropdown: the aggregate label,
/// the group labels, then every SHS cause that does not belong to a group.
pub fn health_condition_labels() -> Vec<&'static str> {
    let mut labels = Vec::with_capacity(1 + CAUSE_GROUPS.len() + SHS_CAUSES.len());
    labels.push(ALL_HEALTH_CONDITIONS);
    labels.extend(CAUSE_GROUPS.iter().map(|group| group.label));
    labels.extend(
        SHS_CAUSES
            .iter()
            .copied()
            .filter(|cause| !CAUSE_GROUPS.iter().any(|group| group.causes.contains(cause))),
    );
    labels
}
