//! Compliance Reporting

use crate::aggregate::{Aggregator, ChildSummary, ComplianceCounts, ComplianceSummary, FunctionSummary};
use crate::catalog::ControlCatalog;
use crate::scope::{resolve_scope, Scope, ScopeRef};
use crate::status::{ComplianceStatus, RiskLevel};
use crate::ComplianceResult;
use chrono::{DateTime, Utc};
use ctrack_common::{ControlCode, SystemId, TrackerResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Text export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Report generator
pub struct ReportGenerator;

impl ReportGenerator {
    /// Snapshot report for one scope
    pub fn scope_report(
        aggregator: &Aggregator<'_>,
        scope: &Scope,
        catalog: &ControlCatalog,
    ) -> ComplianceResult<ComplianceReport> {
        let hierarchy = aggregator.hierarchy();
        let breadcrumb = resolve_scope(scope, hierarchy)?
            .map(|r| r.breadcrumb())
            .unwrap_or_default();

        let names: HashMap<&SystemId, &str> = hierarchy
            .systems()
            .into_iter()
            .map(|s| (&s.id, s.name.as_str()))
            .collect();

        let mut gaps: Vec<Gap> = aggregator
            .assessments_in_scope(scope)?
            .into_iter()
            .filter(|a| a.status.is_gap())
            .map(|a| Gap {
                system_id: a.system_id.clone(),
                system_name: names.get(&a.system_id).map(|n| n.to_string()).unwrap_or_default(),
                control_id: a.control_id.clone(),
                control_title: catalog.get(&a.control_id).map(|c| c.title.clone()),
                status: a.status,
                risk_level: a.risk_level,
            })
            .collect();
        gaps.sort_by(|a, b| {
            a.system_id
                .cmp(&b.system_id)
                .then_with(|| a.control_id.cmp(&b.control_id))
        });

        let mut report = ComplianceReport {
            scope: scope.clone(),
            breadcrumb,
            summary: aggregator.summary_for_scope(scope)?,
            children: aggregator.children_of(scope)?,
            functions: aggregator.function_breakdown(scope, catalog)?,
            gaps,
            generated_at: Utc::now(),
            digest: String::new(),
        };
        report.digest = report.compute_digest()?;

        tracing::info!(
            scope = %scope.to_query_string(),
            score = report.summary.compliance_score,
            gaps = report.gaps.len(),
            "generated compliance report"
        );
        Ok(report)
    }
}

/// Assessed control that is not fully implemented
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub system_id: SystemId,
    pub system_name: String,
    pub control_id: ControlCode,
    pub control_title: Option<String>,
    pub status: ComplianceStatus,
    pub risk_level: Option<RiskLevel>,
}

/// Compliance report for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub scope: Scope,
    pub breadcrumb: Vec<ScopeRef>,
    pub summary: ComplianceSummary,
    pub children: Vec<ChildSummary>,
    pub functions: Vec<FunctionSummary>,
    pub gaps: Vec<Gap>,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the JSON body without this field
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

const CSV_HEADER: &str = "record,kind,id,name,control,control_title,status,risk_level,compliant,\
partially_compliant,non_compliant,not_assessed,not_applicable,total,compliance_score";

impl ComplianceReport {
    fn compute_digest(&self) -> TrackerResult<String> {
        let mut body = self.clone();
        body.digest.clear();
        let bytes = serde_json::to_vec(&body)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// True when the body still matches its digest
    pub fn verify_digest(&self) -> bool {
        self.compute_digest().map(|d| d == self.digest).unwrap_or(false)
    }

    pub fn export(&self, format: ExportFormat) -> TrackerResult<String> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ExportFormat::Csv => Ok(self.to_csv()),
        }
    }

    fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);
        csv.push_str("\r\n");

        let (kind, id, name) = match &self.scope {
            Scope::Root => ("root".to_string(), String::new(), "All".to_string()),
            Scope::Node(r) => (
                r.kind.to_string(),
                r.id.to_string(),
                r.label.clone().unwrap_or_default(),
            ),
        };
        push_summary_row(&mut csv, "summary", &kind, &id, &name, &self.summary);

        for child in &self.children {
            push_summary_row(
                &mut csv,
                "child",
                child.scope.kind.as_str(),
                child.scope.id.as_str(),
                child.scope.label.as_deref().unwrap_or_default(),
                &child.summary,
            );
        }
        for f in &self.functions {
            push_summary_row(&mut csv, "function", "function", f.function.code(), &f.function.to_string(), &f.summary);
        }
        for gap in &self.gaps {
            let risk = gap.risk_level.map(|r| r.to_string()).unwrap_or_default();
            let fields = [
                "gap",
                "system",
                gap.system_id.as_str(),
                gap.system_name.as_str(),
                gap.control_id.as_str(),
                gap.control_title.as_deref().unwrap_or_default(),
                gap.status.label(),
                risk.as_str(),
            ];
            push_row(&mut csv, fields.iter().copied().chain(std::iter::repeat("").take(7)));
        }
        csv
    }
}

fn push_summary_row(csv: &mut String, record: &str, kind: &str, id: &str, name: &str, summary: &ComplianceSummary) {
    let ComplianceCounts {
        compliant,
        partially_compliant,
        non_compliant,
        not_assessed,
        not_applicable,
    } = summary.counts;
    let numbers = [
        compliant,
        partially_compliant,
        non_compliant,
        not_assessed,
        not_applicable,
        summary.total,
        summary.compliance_score as usize,
    ]
    .map(|n| n.to_string());

    let fields = [record, kind, id, name, "", "", "", ""];
    push_row(csv, fields.iter().copied().chain(numbers.iter().map(String::as_str)));
}

fn push_row<'a>(csv: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            csv.push(',');
        }
        csv.push_str(&csv_field(field));
    }
    csv.push_str("\r\n");
}

/// RFC 4180 quoting
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::catalog;
    use crate::hierarchy::fixtures::*;
    use crate::ledger::Assessment;
    use crate::scope::ScopeKind;
    use ComplianceStatus::*;

    fn assessment(system: &str, control: &str, status: ComplianceStatus) -> Assessment {
        Assessment::new(id(system), ControlCode::parse(control).unwrap(), status)
    }

    fn data() -> Vec<Assessment> {
        vec![
            assessment("s2", "PR.AA-01", NotImplemented),
            assessment("s1", "PR.AA-10", PartiallyImplemented),
            assessment("s1", "PR.AA-2", NotImplemented),
            assessment("s1", "DE.CM-01", Implemented),
            assessment("s4", "RS.MA-01", NotImplemented),
        ]
    }

    #[test]
    fn test_product_report() {
        let h = sample();
        let data = data();
        let agg = Aggregator::new(&h, &data);
        let catalog = catalog(&["PR.AA-01", "PR.AA-2"]);
        let report =
            ReportGenerator::scope_report(&agg, &Scope::node(ScopeKind::Product, id("p1")), &catalog).unwrap();

        let crumbs: Vec<_> = report.breadcrumb.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(crumbs, vec!["c1", "f1", "p1"]);
        assert_eq!(report.children.len(), 2);
        assert_eq!(report.functions.len(), 6);

        let gaps: Vec<_> = report
            .gaps
            .iter()
            .map(|g| (g.system_id.as_str(), g.control_id.as_str()))
            .collect();
        assert_eq!(gaps, vec![("s1", "PR.AA-2"), ("s1", "PR.AA-10"), ("s2", "PR.AA-01")]);
        assert_eq!(report.gaps[0].control_title.as_deref(), Some("Control PR.AA-2"));
        assert_eq!(report.gaps[2].system_name, "System s2");

        assert_eq!(report.digest.len(), 64);
        assert!(report.verify_digest());
        let mut tampered = report.clone();
        tampered.summary.compliance_score = 100;
        assert!(!tampered.verify_digest());
    }

    #[test]
    fn test_csv_gap_rows_carry_title_and_risk() {
        let h = sample();
        let mut data = data();
        data[2].risk_level = Some(RiskLevel::High);
        let agg = Aggregator::new(&h, &data);
        let catalog = catalog(&["PR.AA-2"]);
        let report =
            ReportGenerator::scope_report(&agg, &Scope::node(ScopeKind::System, id("s1")), &catalog).unwrap();

        let csv = report.export(ExportFormat::Csv).unwrap();
        assert!(csv.contains("gap,system,s1,System s1,PR.AA-2,Control PR.AA-2,Not Implemented,high,,,,,,,\r\n"));
        assert!(csv.contains("gap,system,s1,System s1,PR.AA-10,,Partially Implemented,,,,,,,,\r\n"));
    }

    #[test]
    fn test_unknown_scope_is_an_error() {
        let h = sample();
        let data = data();
        let agg = Aggregator::new(&h, &data);
        let result = ReportGenerator::scope_report(
            &agg,
            &Scope::node(ScopeKind::Framework, id("missing")),
            &ControlCatalog::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_csv_export_quotes_fields() {
        let mut h = sample();
        h.capability_centres[1].frameworks[0].products[0].systems[0].name = "Ledger, \"core\"".into();
        let data = data();
        let agg = Aggregator::new(&h, &data);
        let report = ReportGenerator::scope_report(&agg, &Scope::Root, &ControlCatalog::default()).unwrap();

        let csv = report.export(ExportFormat::Csv).unwrap();
        let lines: Vec<_> = csv.split("\r\n").collect();
        assert_eq!(lines[0], CSV_HEADER);
        let columns = CSV_HEADER.split(',').count();
        assert_eq!(columns, 15);
        assert!(lines[1].starts_with("summary,root,,All,,,,,1,1,3,0,0,5,"));
        assert!(csv.contains("gap,system,s4,\"Ledger, \"\"core\"\"\",RS.MA-01,,Not Implemented,,,,,,,,\r\n"));
        for line in lines.iter().filter(|l| !l.is_empty() && !l.contains('"')) {
            assert_eq!(line.split(',').count(), columns, "{line}");
        }

        let json = report.export(ExportFormat::Json).unwrap();
        let parsed: ComplianceReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
