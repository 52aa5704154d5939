//! Declarative field schema.
//!
//! The schema is data: a catalog of field definitions, the dependency
//! edges between the selection fields, and per-company exclusions. The
//! engine interprets it; nothing branches on concrete field names outside
//! this module.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldKind};

use crate::dep_graph::{CycleError, DependencyGraph};

/// Whether a field belongs to the selection hierarchy or the benefit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldGroup {
    /// Hierarchical selection fields (company, cost center, position, ...).
    Primary,
    /// Numeric benefit amounts filled by hand or by the calculation service.
    Benefit,
}

/// Definition of one field in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: FieldKey,
    pub kind: FieldKind,
    pub label: String,
    pub group: FieldGroup,
}

impl FieldDef {
    fn select(key: &str, label: &str) -> Self {
        Self {
            key: FieldKey::from(key),
            kind: FieldKind::Select,
            label: label.to_string(),
            group: FieldGroup::Primary,
        }
    }

    fn benefit(key: &str, label: &str) -> Self {
        Self {
            key: FieldKey::from(key),
            kind: FieldKind::Number,
            label: label.to_string(),
            group: FieldGroup::Benefit,
        }
    }
}

/// What changing a field would drag along with it.
///
/// Lets a host warn before the user edits a high-fan-out field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpactInfo {
    /// Number of fields whose option lists would reload (transitive).
    pub affected_fields: usize,
    /// Longest reload chain below the field.
    pub max_depth: usize,
}

/// The field catalog plus its dependency graph.
///
/// Immutable once built; shared by every row in a batch.
#[derive(Debug, Clone)]
pub struct Schema {
    defs: Vec<FieldDef>,
    by_key: FxHashMap<FieldKey, usize>,
    graph: DependencyGraph,
    /// Stable topological position per field, for deterministic reload order.
    topo_index: FxHashMap<FieldKey, usize>,
    /// Fields that do not apply to a given company.
    excluded: FxHashMap<String, FxHashSet<FieldKey>>,
}

impl Schema {
    /// Build a schema from a catalog and dependency edge list.
    ///
    /// Edges are `(parent, child)` pairs; both ends must be declared in
    /// the catalog. Fails if an edge would close a cycle.
    pub fn build(defs: Vec<FieldDef>, edges: &[(&str, &str)]) -> Result<Self, CycleError> {
        let mut by_key = FxHashMap::default();
        for (idx, def) in defs.iter().enumerate() {
            by_key.insert(def.key.clone(), idx);
        }

        let mut graph = DependencyGraph::new();
        for (parent, child) in edges {
            debug_assert!(by_key.contains_key(*parent), "undeclared parent {}", parent);
            debug_assert!(by_key.contains_key(*child), "undeclared child {}", child);
            graph.add_edges(&FieldKey::from(*child), &[FieldKey::from(*parent)])?;
        }

        let mut topo_index = FxHashMap::default();
        for (pos, key) in graph.topo_order().into_iter().enumerate() {
            topo_index.insert(key, pos);
        }
        // Fields outside the graph (benefit amounts) sort after all
        // selection fields, in catalog order.
        let base = topo_index.len();
        for (idx, def) in defs.iter().enumerate() {
            topo_index.entry(def.key.clone()).or_insert(base + idx);
        }

        Ok(Self {
            defs,
            by_key,
            graph,
            topo_index,
            excluded: FxHashMap::default(),
        })
    }

    /// The standard budget-row schema: the selection hierarchy and the
    /// benefit block every deployment starts from.
    pub fn standard() -> Self {
        let mut defs = vec![
            FieldDef::select("company", "Company"),
            FieldDef::select("format", "Format"),
            FieldDef::select("year", "Budget Year"),
            FieldDef::select("cost_center", "Cost Center"),
            FieldDef::select("division", "Division"),
            FieldDef::select("department", "Department"),
            FieldDef::select("section", "Section"),
            FieldDef::select("store", "Store"),
            FieldDef::select("position", "Position"),
            FieldDef::select("job_band", "Job Band"),
            FieldDef::select("salary_structure", "Salary Structure"),
            FieldDef::select("employee_level", "Employee Level"),
            FieldDef::select("plan_cost_center", "Plan Cost Center"),
            FieldDef::select("run_rate_group", "Run Rate Group"),
        ];
        for &(key, label) in BENEFIT_FIELDS {
            defs.push(FieldDef::benefit(key, label));
        }

        Self::build(defs, STANDARD_EDGES).expect("standard schema is acyclic")
    }

    /// Exclude fields from a company's row layout.
    pub fn with_excluded(mut self, company: &str, keys: &[&str]) -> Self {
        let set = self.excluded.entry(company.to_string()).or_default();
        set.extend(keys.iter().map(|k| FieldKey::from(*k)));
        self
    }

    /// Definition lookup.
    pub fn def(&self, key: &FieldKey) -> Option<&FieldDef> {
        self.by_key.get(key).map(|idx| &self.defs[*idx])
    }

    /// All declared definitions, catalog order.
    pub fn defs(&self) -> &[FieldDef] {
        &self.defs
    }

    /// Definitions applicable to a company, catalog order.
    pub fn defs_for_company<'a>(&'a self, company: &'a str) -> impl Iterator<Item = &'a FieldDef> {
        let excluded = self.excluded.get(company);
        self.defs
            .iter()
            .filter(move |def| excluded.map_or(true, |set| !set.contains(&def.key)))
    }

    /// True if the field applies to the company.
    pub fn applies_to(&self, key: &FieldKey, company: &str) -> bool {
        self.by_key.contains_key(key)
            && self
                .excluded
                .get(company)
                .map_or(true, |set| !set.contains(key))
    }

    /// The dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Selection fields with no parents (loaded as soon as a row exists).
    pub fn root_selects(&self) -> Vec<FieldKey> {
        let mut roots: Vec<FieldKey> = self
            .defs
            .iter()
            .filter(|def| def.kind == FieldKind::Select && !self.graph.has_parents(&def.key))
            .map(|def| def.key.clone())
            .collect();
        roots.sort_by_key(|k| self.topo_position(k));
        roots
    }

    /// Stable topological position of a field.
    pub fn topo_position(&self, key: &FieldKey) -> usize {
        self.topo_index.get(key).copied().unwrap_or(usize::MAX)
    }

    /// Sort keys so parents come before children, deterministically.
    pub fn sort_topologically(&self, keys: &mut Vec<FieldKey>) {
        keys.sort_by(|a, b| {
            self.topo_position(a)
                .cmp(&self.topo_position(b))
                .then_with(|| a.cmp(b))
        });
    }

    /// Reload impact of changing a field.
    pub fn impact_of(&self, key: &FieldKey) -> ImpactInfo {
        let descendants = self.graph.descendants_of(key);
        if descendants.is_empty() {
            return ImpactInfo::default();
        }

        // Depth per descendant = 1 + max parent depth among descendants.
        let set: FxHashSet<&FieldKey> = descendants.iter().collect();
        let mut depth: FxHashMap<&FieldKey, usize> = FxHashMap::default();
        let mut max_depth = 0;
        for field in &descendants {
            let d = self
                .graph
                .parents(field)
                .filter(|p| set.contains(p))
                .filter_map(|p| depth.get(p).copied())
                .max()
                .map_or(1, |pd| pd + 1);
            max_depth = max_depth.max(d);
            depth.insert(field, d);
        }

        ImpactInfo {
            affected_fields: descendants.len(),
            max_depth,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::standard()
    }
}

/// The selection hierarchy: each pair is `(parent, child)`.
const STANDARD_EDGES: &[(&str, &str)] = &[
    ("company", "format"),
    ("format", "year"),
    ("year", "cost_center"),
    ("cost_center", "division"),
    ("division", "department"),
    ("department", "section"),
    ("section", "store"),
    ("store", "position"),
    ("position", "job_band"),
    ("job_band", "salary_structure"),
    ("job_band", "employee_level"),
    ("plan_cost_center", "run_rate_group"),
];

/// The benefit block: numeric amounts, typed by hand or computed remotely.
const BENEFIT_FIELDS: &[(&str, &str)] = &[
    ("payroll_amount", "Payroll"),
    ("bonus", "Bonus"),
    ("overtime", "Overtime"),
    ("incentive", "Incentive"),
    ("commission", "Commission"),
    ("kpi_bonus", "KPI Bonus"),
    ("thirteenth_month", "13th Month Pay"),
    ("position_allowance", "Position Allowance"),
    ("acting_allowance", "Acting Allowance"),
    ("housing_allowance", "Housing Allowance"),
    ("transport_allowance", "Transport Allowance"),
    ("meal_allowance", "Meal Allowance"),
    ("shift_allowance", "Shift Allowance"),
    ("skill_allowance", "Skill Allowance"),
    ("language_allowance", "Language Allowance"),
    ("phone_allowance", "Phone Allowance"),
    ("car_allowance", "Car Allowance"),
    ("fuel_allowance", "Fuel Allowance"),
    ("parking_fee", "Parking Fee"),
    ("toll_fee", "Toll Fee"),
    ("per_diem", "Per Diem"),
    ("travel_expense", "Travel Expense"),
    ("relocation_allowance", "Relocation Allowance"),
    ("hardship_allowance", "Hardship Allowance"),
    ("region_allowance", "Region Allowance"),
    ("temporary_duty", "Temporary Duty"),
    ("diligence_allowance", "Diligence Allowance"),
    ("special_allowance", "Special Allowance"),
    ("social_security", "Social Security"),
    ("provident_fund", "Provident Fund"),
    ("workmen_compensation", "Workmen Compensation"),
    ("medical_opd", "Medical (OPD)"),
    ("medical_ipd", "Medical (IPD)"),
    ("dental_benefit", "Dental"),
    ("annual_checkup", "Annual Health Checkup"),
    ("life_insurance", "Life Insurance"),
    ("health_insurance", "Health Insurance"),
    ("accident_insurance", "Accident Insurance"),
    ("uniform_expense", "Uniform"),
    ("training_expense", "Training"),
    ("severance", "Severance"),
    ("gratuity", "Gratuity"),
    ("long_service_award", "Long Service Award"),
    ("vacation_payout", "Vacation Payout"),
    ("maternity_benefit", "Maternity Benefit"),
    ("funeral_assistance", "Funeral Assistance"),
    ("education_assistance", "Education Assistance"),
    ("staff_discount", "Staff Discount"),
    ("welfare_fund", "Welfare Fund"),
    ("other_benefit", "Other Benefit"),
];
