//! Declarative row validation.
//!
//! Rules are data, not code: a `RuleSet` holds rule records that the
//! engine interprets, so deployments can toggle rules without touching
//! the validator. Company-specific checks are injected predicates looked
//! up by name.
//!
//! Re-running validation fully replaces the previous result for a row;
//! there is no incremental patching to go stale.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldKind, FieldValue, ValidationStatus};

use crate::field::OptionState;
use crate::row::Row;

/// A predicate injected by the host for company-specific checks.
///
/// Returns a message when the rule is violated.
pub type RowPredicate = Box<dyn Fn(&Row) -> Option<String>>;

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// The field must hold a value (for selects: an option must be chosen).
    Required,
    /// Flag a numeric field whose value is exactly zero or negative.
    ZeroWarning,
    /// Run the named injected predicate; diagnostics anchor to the
    /// rule's field with the given severity.
    CompanySpecific {
        predicate: String,
        severity: ValidationStatus,
    },
}

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnabledWhen {
    Always,
    ForCompanies(Vec<String>),
}

impl EnabledWhen {
    fn matches(&self, company: &str) -> bool {
        match self {
            EnabledWhen::Always => true,
            EnabledWhen::ForCompanies(list) => list.iter().any(|c| c == company),
        }
    }
}

/// One validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub field: FieldKey,
    pub kind: RuleKind,
    pub enabled: EnabledWhen,
}

impl ValidationRule {
    /// A required-field rule, enabled everywhere.
    pub fn required(field: &str) -> Self {
        Self {
            field: FieldKey::from(field),
            kind: RuleKind::Required,
            enabled: EnabledWhen::Always,
        }
    }

    /// A zero/negative-amount warning rule, enabled everywhere.
    pub fn zero_warning(field: &str) -> Self {
        Self {
            field: FieldKey::from(field),
            kind: RuleKind::ZeroWarning,
            enabled: EnabledWhen::Always,
        }
    }

    /// A company-specific rule delegating to an injected predicate.
    pub fn company_specific(field: &str, predicate: &str, severity: ValidationStatus) -> Self {
        Self {
            field: FieldKey::from(field),
            kind: RuleKind::CompanySpecific {
                predicate: predicate.to_string(),
                severity,
            },
            enabled: EnabledWhen::Always,
        }
    }

    /// Restrict the rule to the given companies.
    pub fn for_companies(mut self, companies: &[&str]) -> Self {
        self.enabled = EnabledWhen::ForCompanies(companies.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// The rule table plus the registry of injected predicates.
pub struct RuleSet {
    rules: Vec<ValidationRule>,
    predicates: FxHashMap<String, RowPredicate>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules)
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    /// An empty rule set.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            predicates: FxHashMap::default(),
        }
    }

    /// The standard rule table: the selection hierarchy is required, the
    /// payroll amount warns at zero.
    pub fn standard() -> Self {
        let mut set = Self::new();
        for field in [
            "company",
            "format",
            "year",
            "cost_center",
            "division",
            "department",
            "section",
            "store",
            "position",
            "job_band",
            "salary_structure",
        ] {
            set.rules.push(ValidationRule::required(field));
        }
        set.rules.push(ValidationRule::zero_warning("payroll_amount"));
        set
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Register an injected predicate under a name.
    pub fn with_predicate(
        mut self,
        name: &str,
        predicate: impl Fn(&Row) -> Option<String> + 'static,
    ) -> Self {
        self.predicates.insert(name.to_string(), Box::new(predicate));
        self
    }

    /// The declared rules.
    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// True if a required rule applies to this field for this company.
    pub fn is_required(&self, field: &FieldKey, company: &str) -> bool {
        self.rules.iter().any(|r| {
            r.kind == RuleKind::Required && r.field == *field && r.enabled.matches(company)
        })
    }

    fn predicate(&self, name: &str) -> Option<&RowPredicate> {
        self.predicates.get(name)
    }
}

/// A predicate requiring at least `min` positive benefit amounts.
///
/// The usual shape of the injected company rules; provided here so
/// deployments don't each rewrite it.
pub fn min_benefit_coverage(min: usize) -> impl Fn(&Row) -> Option<String> {
    move |row: &Row| {
        let count = row.positive_amount_count();
        if count < min {
            Some(format!(
                "at least {} benefit amounts must be non-zero ({} given)",
                min, count
            ))
        } else {
            None
        }
    }
}

/// One finding against one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub field: FieldKey,
    pub message: String,
    pub status: ValidationStatus,
}

/// Complete validation verdict for a row.
///
/// Recomputed wholesale on every validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowValidationResult {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub field_statuses: FxHashMap<FieldKey, ValidationStatus>,
    pub is_valid: bool,
}

impl RowValidationResult {
    /// Errors followed by warnings, in rule order. What a host displays.
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut all = self.errors.clone();
        all.extend(self.warnings.iter().cloned());
        all
    }

    /// Verdict for one field (error > warning > valid > empty).
    pub fn status_of(&self, field: &FieldKey) -> ValidationStatus {
        self.field_statuses.get(field).copied().unwrap_or_default()
    }
}

/// Validate one row against the rule set.
///
/// Pure over its inputs: calling it twice without a field change in
/// between yields identical results.
pub fn validate_row(row: &Row, rules: &RuleSet) -> RowValidationResult {
    let mut result = RowValidationResult::default();

    // Baseline status: valid if the field holds something, empty otherwise.
    for field in row.fields() {
        let base = if field.is_empty() {
            ValidationStatus::Empty
        } else {
            ValidationStatus::Valid
        };
        result.field_statuses.insert(field.key.clone(), base);
    }

    for rule in rules.rules() {
        if !rule.enabled.matches(row.company()) {
            continue;
        }

        match &rule.kind {
            RuleKind::Required => {
                // A rule for a field the company does not carry is inert.
                let Some(field) = row.field(&rule.field) else {
                    continue;
                };
                if field.is_empty() {
                    push(
                        &mut result,
                        Diagnostic {
                            field: rule.field.clone(),
                            message: format!("{} is required", humanize(rule.field.as_str())),
                            status: ValidationStatus::Error,
                        },
                    );
                }
            }
            RuleKind::ZeroWarning => {
                let Some(field) = row.field(&rule.field) else {
                    continue;
                };
                if let FieldValue::Number(n) = field.value {
                    if n <= 0.0 {
                        push(
                            &mut result,
                            Diagnostic {
                                field: rule.field.clone(),
                                message: format!(
                                    "{} is zero or negative",
                                    humanize(rule.field.as_str())
                                ),
                                status: ValidationStatus::Warning,
                            },
                        );
                    }
                }
            }
            RuleKind::CompanySpecific {
                predicate,
                severity,
            } => {
                let Some(check) = rules.predicate(predicate) else {
                    // Unregistered predicate: skip rather than guess.
                    log::warn!("validation predicate {} not registered", predicate);
                    continue;
                };
                if let Some(message) = check(row) {
                    push(
                        &mut result,
                        Diagnostic {
                            field: rule.field.clone(),
                            message,
                            status: *severity,
                        },
                    );
                }
            }
        }
    }

    // An option list that failed to load keeps the row editable but the
    // user must know the selection may be incomplete.
    for field in row.fields() {
        if field.kind == FieldKind::Select && field.options == OptionState::Unavailable {
            push(
                &mut result,
                Diagnostic {
                    field: field.key.clone(),
                    message: format!(
                        "{} options could not be loaded; change an upstream field to retry",
                        humanize(field.key.as_str())
                    ),
                    status: ValidationStatus::Warning,
                },
            );
        }
    }

    result.is_valid = result.errors.is_empty();
    result
}

/// Record one finding: fold it into the field's status and file it under
/// errors or warnings.
fn push(result: &mut RowValidationResult, diag: Diagnostic) {
    let entry = result
        .field_statuses
        .entry(diag.field.clone())
        .or_default();
    *entry = entry.combine(diag.status);
    match diag.status {
        ValidationStatus::Error => result.errors.push(diag),
        _ => result.warnings.push(diag),
    }
}

/// `cost_center` → `Cost Center`.
fn humanize(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowId;
    use crate::schema::Schema;

    fn ready_row(company: &str) -> Row {
        let schema = Schema::standard();
        Row::new(RowId(1), company, &schema)
    }

    fn set_number(row: &mut Row, key: &str, value: &str) {
        row.field_mut(&FieldKey::from(key)).unwrap().set_user_value(value);
    }

    #[test]
    fn test_empty_required_field_is_an_error() {
        let row = ready_row("BJC");
        let rules = RuleSet::standard();

        let result = validate_row(&row, &rules);

        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|d| d.field == FieldKey::from("cost_center")));
        assert_eq!(
            result.status_of(&FieldKey::from("cost_center")),
            ValidationStatus::Error
        );
    }

    #[test]
    fn test_zero_payroll_is_a_warning_not_an_error() {
        let mut row = ready_row("BJC");
        set_number(&mut row, "payroll_amount", "0");
        let rules = RuleSet::standard();

        let result = validate_row(&row, &rules);

        let payroll = FieldKey::from("payroll_amount");
        assert!(result.warnings.iter().any(|d| d.field == payroll));
        assert!(!result.errors.iter().any(|d| d.field == payroll));
        assert_eq!(result.status_of(&payroll), ValidationStatus::Warning);
    }

    #[test]
    fn test_empty_cost_center_and_zero_payroll_scenario() {
        // company=BJC, cost_center empty, payroll 0:
        // invalid overall, error on cost_center, warning on payroll.
        let mut row = ready_row("BJC");
        set_number(&mut row, "payroll_amount", "0");
        let rules = RuleSet::standard();

        let result = validate_row(&row, &rules);

        assert!(!result.is_valid);
        assert_eq!(
            result.status_of(&FieldKey::from("cost_center")),
            ValidationStatus::Error
        );
        assert_eq!(
            result.status_of(&FieldKey::from("payroll_amount")),
            ValidationStatus::Warning
        );
    }

    #[test]
    fn test_warnings_do_not_block_validity() {
        let schema = Schema::standard();
        let mut row = Row::new(RowId(1), "BJC", &schema);
        let rules = RuleSet::standard();
        // Fill every required select so only the zero warning remains.
        for rule in rules.rules() {
            if rule.kind == RuleKind::Required {
                row.field_mut(&rule.field).unwrap().value =
                    FieldValue::Text("x".to_string());
            }
        }
        set_number(&mut row, "payroll_amount", "0");

        let result = validate_row(&row, &rules);
        assert!(result.is_valid);
        assert_eq!(result.errors.len(), 0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let mut row = ready_row("BJC");
        set_number(&mut row, "payroll_amount", "0");
        let rules = RuleSet::standard();

        let first = validate_row(&row, &rules);
        let second = validate_row(&row, &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rule_for_absent_field_is_inert() {
        let schema = Schema::standard().with_excluded("OGC", &["store"]);
        let row = Row::new(RowId(1), "OGC", &schema);
        let rules = RuleSet::standard();

        let result = validate_row(&row, &rules);
        assert!(!result
            .errors
            .iter()
            .any(|d| d.field == FieldKey::from("store")));
    }

    #[test]
    fn test_company_scoped_rule() {
        let rules = RuleSet::new()
            .with_rule(ValidationRule::required("run_rate_group").for_companies(&["BJC"]));

        let bjc = validate_row(&ready_row("BJC"), &rules);
        assert!(!bjc.is_valid);

        let ogc = validate_row(&ready_row("OGC"), &rules);
        assert!(ogc.is_valid);
    }

    #[test]
    fn test_injected_company_predicate() {
        let rules = RuleSet::new()
            .with_rule(ValidationRule::company_specific(
                "payroll_amount",
                "min_benefit_coverage",
                ValidationStatus::Warning,
            ))
            .with_predicate("min_benefit_coverage", min_benefit_coverage(2));

        let mut row = ready_row("BJC");
        set_number(&mut row, "payroll_amount", "50000");

        let result = validate_row(&row, &rules);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("at least 2"));

        set_number(&mut row, "bonus", "1000");
        let result = validate_row(&row, &rules);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unregistered_predicate_is_skipped() {
        let rules = RuleSet::new().with_rule(ValidationRule::company_specific(
            "payroll_amount",
            "no_such_predicate",
            ValidationStatus::Error,
        ));

        let result = validate_row(&ready_row("BJC"), &rules);
        assert!(result.is_valid);
    }

    #[test]
    fn test_unavailable_options_surface_as_warning() {
        let mut row = ready_row("BJC");
        row.field_mut(&FieldKey::from("division")).unwrap().options = OptionState::Unavailable;

        let result = validate_row(&row, &RuleSet::new());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, FieldKey::from("division"));
        assert!(result.is_valid, "a fetch failure never blocks the row");
    }

    #[test]
    fn test_is_required_lookup() {
        let rules = RuleSet::standard();
        assert!(rules.is_required(&FieldKey::from("cost_center"), "BJC"));
        assert!(!rules.is_required(&FieldKey::from("bonus"), "BJC"));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("cost_center"), "Cost Center");
        assert_eq!(humanize("payroll_amount"), "Payroll Amount");
        assert_eq!(humanize("year"), "Year");
    }
}
