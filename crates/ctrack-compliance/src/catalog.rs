//! Control Catalog
//!
//! Static reference data: Functions -> Categories -> Controls, with
//! optional mappings from external-framework controls. Indexed once per
//! session from the flat list the backend returns.
//!
//! A control's category comes from the versioned [`CategoryMap`] shipped
//! with the catalog when it has a valid entry, and otherwise from the
//! control code itself (`DE.AE-01` -> `DE.AE`). The server's own
//! `category_id` field is carried through but never used for grouping.

use ctrack_common::ControlCode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Catalog errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("category mapping {control} -> {category} crosses functions or is malformed")]
    InvalidCategoryMapping { control: String, category: String },

    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

/// Top-level framework function
///
/// Declaration order is the canonical display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Function {
    Govern,
    Identify,
    Protect,
    Detect,
    Respond,
    Recover,
}

impl Function {
    /// Canonical display order
    pub const CANONICAL_ORDER: [Function; 6] = [
        Self::Govern,
        Self::Identify,
        Self::Protect,
        Self::Detect,
        Self::Respond,
        Self::Recover,
    ];

    /// Two-letter code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Govern => "GV",
            Self::Identify => "ID",
            Self::Protect => "PR",
            Self::Detect => "DE",
            Self::Respond => "RS",
            Self::Recover => "RC",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CatalogError> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|f| f.code() == code)
            .ok_or_else(|| CatalogError::UnknownFunction(code.to_string()))
    }

    /// Function a control belongs to
    pub fn of(code: &ControlCode) -> Result<Self, CatalogError> {
        Self::from_code(code.function())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Govern => "Govern",
            Self::Identify => "Identify",
            Self::Protect => "Protect",
            Self::Detect => "Detect",
            Self::Respond => "Respond",
            Self::Recover => "Recover",
        };
        f.write_str(name)
    }
}

/// Control as delivered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRecord {
    pub id: String,
    #[serde(default)]
    pub function_id: String,
    #[serde(default)]
    pub category_id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub implementation_examples: Vec<String>,
}

/// Validated, indexed control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    pub code: ControlCode,
    pub function: Function,
    /// Category used for grouping (mapping table or code prefix)
    pub category: String,
    /// Category as the server reported it
    pub server_category: String,
    pub title: String,
    pub text: String,
    pub implementation_examples: Vec<String>,
}

/// External-framework control mapped onto a catalog control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMapping {
    pub id: String,
    #[serde(rename = "nistEquivalentId", alias = "nist-equivalent-id")]
    pub nist_equivalent_id: String,
    pub family: String,
    #[serde(default)]
    pub priority: Option<String>,
}

fn category_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2}\.[A-Z]{2}$").expect("static category pattern"))
}

/// Versioned control -> category table delivered with the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMap {
    pub version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl CategoryMap {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, control: impl Into<String>, category: impl Into<String>) -> Self {
        self.entries.insert(control.into(), category.into());
        self
    }

    /// Mapped category, if the entry is well-formed and stays inside the
    /// control's function
    pub fn category_for(&self, code: &ControlCode) -> Option<&str> {
        self.entries
            .get(code.as_str())
            .map(String::as_str)
            .filter(|category| Self::is_valid_entry(code, category))
    }

    /// Reject the table if any entry is malformed or crosses functions
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (control, category) in &self.entries {
            let valid = ControlCode::parse(control.as_str())
                .map(|code| Self::is_valid_entry(&code, category))
                .unwrap_or(false);
            if !valid {
                return Err(CatalogError::InvalidCategoryMapping {
                    control: control.clone(),
                    category: category.clone(),
                });
            }
        }
        Ok(())
    }

    fn is_valid_entry(code: &ControlCode, category: &str) -> bool {
        category_pattern().is_match(category) && category[..2] == *code.function()
    }
}

/// Category with its controls, in code order
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode<'c> {
    pub code: &'c str,
    pub controls: Vec<&'c Control>,
}

/// Function with its categories, in code order
#[derive(Debug, Clone, Serialize)]
pub struct FunctionNode<'c> {
    pub function: Function,
    pub categories: Vec<CategoryNode<'c>>,
}

/// Indexed control catalog
#[derive(Debug, Clone, Default)]
pub struct ControlCatalog {
    controls: Vec<Control>,
    by_code: HashMap<ControlCode, usize>,
    by_function: BTreeMap<Function, Vec<usize>>,
    by_category: BTreeMap<String, Vec<usize>>,
    mappings: HashMap<ControlCode, Vec<ExternalMapping>>,
    category_map_version: Option<String>,
}

impl ControlCatalog {
    /// Build every index from the backend's flat lists
    ///
    /// Controls whose code does not parse, or whose function is unknown,
    /// are skipped. Later duplicates of a code are dropped.
    pub fn build(
        records: Vec<ControlRecord>,
        mappings: Vec<ExternalMapping>,
        category_map: Option<&CategoryMap>,
    ) -> Self {
        let mut controls: Vec<Control> = Vec::with_capacity(records.len());
        let mut seen: HashSet<ControlCode> = HashSet::new();

        for record in records {
            let code = match ControlCode::parse(record.id.as_str()) {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping control with malformed code");
                    continue;
                }
            };
            let function = match Function::of(&code) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(control = %code, error = %e, "skipping control");
                    continue;
                }
            };
            if !seen.insert(code.clone()) {
                tracing::warn!(control = %code, "duplicate control code, keeping the first");
                continue;
            }

            let mapped = category_map.and_then(|m| m.category_for(&code));
            if category_map.is_some_and(|m| m.entries.contains_key(code.as_str())) && mapped.is_none() {
                tracing::warn!(control = %code, "ignoring invalid category mapping entry");
            }
            let category = mapped.unwrap_or_else(|| code.category()).to_string();

            controls.push(Control {
                function,
                category,
                server_category: record.category_id,
                title: record.title,
                text: record.text,
                implementation_examples: record.implementation_examples,
                code,
            });
        }

        controls.sort_by(|a, b| a.code.cmp(&b.code));

        let mut by_code = HashMap::with_capacity(controls.len());
        let mut by_function: BTreeMap<Function, Vec<usize>> = BTreeMap::new();
        let mut by_category: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, control) in controls.iter().enumerate() {
            by_code.insert(control.code.clone(), idx);
            by_function.entry(control.function).or_default().push(idx);
            by_category.entry(control.category.clone()).or_default().push(idx);
        }

        let mut mapping_index: HashMap<ControlCode, Vec<ExternalMapping>> = HashMap::new();
        for mapping in mappings {
            match ControlCode::parse(mapping.nist_equivalent_id.as_str()) {
                Ok(code) => mapping_index.entry(code).or_default().push(mapping),
                Err(e) => tracing::warn!(mapping = %mapping.id, error = %e, "skipping external mapping"),
            }
        }

        tracing::info!(
            controls = controls.len(),
            categories = by_category.len(),
            mapped_controls = mapping_index.len(),
            "indexed control catalog"
        );

        Self {
            controls,
            by_code,
            by_function,
            by_category,
            mappings: mapping_index,
            category_map_version: category_map.map(|m| m.version.clone()),
        }
    }

    /// All controls in code order
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, code: &ControlCode) -> Option<&Control> {
        self.by_code.get(code).map(|&idx| &self.controls[idx])
    }

    pub fn by_function(&self, function: Function) -> Vec<&Control> {
        self.indexed(self.by_function.get(&function))
    }

    pub fn by_category(&self, category: &str) -> Vec<&Control> {
        self.indexed(self.by_category.get(category))
    }

    /// External controls mapped onto a catalog control
    pub fn mappings_for(&self, code: &ControlCode) -> &[ExternalMapping] {
        self.mappings.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Version of the category table used to build the catalog
    pub fn category_map_version(&self) -> Option<&str> {
        self.category_map_version.as_deref()
    }

    /// Function -> Category -> Control tree
    ///
    /// Always lists all six functions in canonical order, even those with no
    /// controls.
    pub fn tree(&self) -> Vec<FunctionNode<'_>> {
        Function::CANONICAL_ORDER
            .into_iter()
            .map(|function| {
                let mut categories: BTreeMap<&str, Vec<&Control>> = BTreeMap::new();
                for control in self.by_function(function) {
                    categories.entry(control.category.as_str()).or_default().push(control);
                }
                FunctionNode {
                    function,
                    categories: categories
                        .into_iter()
                        .map(|(code, controls)| CategoryNode { code, controls })
                        .collect(),
                }
            })
            .collect()
    }

    fn indexed(&self, indices: Option<&Vec<usize>>) -> Vec<&Control> {
        indices
            .map(|idx| idx.iter().map(|&i| &self.controls[i]).collect())
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn code(raw: &str) -> ControlCode {
        ControlCode::parse(raw).unwrap()
    }

    #[test]
    fn test_canonical_function_order() {
        let catalog = catalog(&["RC.RP-01", "GV.OC-01", "DE.CM-01", "ID.AM-01"]);
        let order: Vec<_> = catalog.tree().iter().map(|n| n.function).collect();
        assert_eq!(order, Function::CANONICAL_ORDER.to_vec());
        let populated: Vec<_> = catalog
            .tree()
            .iter()
            .filter(|n| !n.categories.is_empty())
            .map(|n| n.function.code())
            .collect();
        assert_eq!(populated, vec!["GV", "ID", "DE", "RC"]);
    }

    #[test]
    fn test_category_derived_from_code_not_server_field() {
        let catalog = catalog(&["DE.AE-02", "DE.AE-10", "DE.CM-01"]);
        let ae: Vec<_> = catalog.by_category("DE.AE").iter().map(|c| c.code.as_str()).collect();
        assert_eq!(ae, vec!["DE.AE-02", "DE.AE-10"]);
        assert!(catalog.by_category("WRONG").is_empty());
        assert_eq!(catalog.get(&code("DE.CM-01")).unwrap().server_category, "WRONG");
    }

    #[test]
    fn test_category_map_overrides_derivation() {
        let map = CategoryMap::new("2024.1")
            .with_entry("PR.AA-05", "PR.AC")
            .with_entry("PR.DS-01", "DE.CM");
        assert!(map.validate().is_err());

        let records = vec![record("PR.AA-05", "a"), record("PR.DS-01", "b")];
        let catalog = ControlCatalog::build(records, Vec::new(), Some(&map));
        assert_eq!(catalog.get(&code("PR.AA-05")).unwrap().category, "PR.AC");
        // cross-function entry is ignored, falling back to the code prefix
        assert_eq!(catalog.get(&code("PR.DS-01")).unwrap().category, "PR.DS");
        assert_eq!(catalog.category_map_version(), Some("2024.1"));
    }

    #[test]
    fn test_malformed_and_duplicate_controls_are_skipped() {
        let records = vec![
            record("GV.OC-01", "first"),
            record("GV.OC-01", "second"),
            record("not-a-code", "bad"),
            record("ZZ.AA-01", "unknown function"),
        ];
        let catalog = ControlCatalog::build(records, Vec::new(), None);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&code("GV.OC-01")).unwrap().title, "first");
    }

    #[test]
    fn test_function_and_tree_indices() {
        let catalog = catalog(&["PR.AA-01", "PR.DS-02", "PR.AA-03", "RS.MA-01"]);
        assert_eq!(catalog.by_function(Function::Protect).len(), 3);
        let tree = catalog.tree();
        let protect = &tree[2];
        assert_eq!(protect.function, Function::Protect);
        let cats: Vec<_> = protect.categories.iter().map(|c| (c.code, c.controls.len())).collect();
        assert_eq!(cats, vec![("PR.AA", 2), ("PR.DS", 1)]);
    }

    #[test]
    fn test_external_mappings_index() {
        let json = r#"[
            {"id": "AC-2", "nistEquivalentId": "PR.AA-01", "family": "Access Control", "priority": "P1"},
            {"id": "IA-2", "nist-equivalent-id": "PR.AA-01", "family": "Identification"},
            {"id": "XX-1", "nistEquivalentId": "garbage", "family": "Other"}
        ]"#;
        let mappings: Vec<ExternalMapping> = serde_json::from_str(json).unwrap();
        let catalog = ControlCatalog::build(vec![record("PR.AA-01", "x")], mappings, None);
        let mapped: Vec<_> = catalog.mappings_for(&code("PR.AA-01")).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(mapped, vec!["AC-2", "IA-2"]);
        assert!(catalog.mappings_for(&code("PR.AA-02")).is_empty());
    }
}
