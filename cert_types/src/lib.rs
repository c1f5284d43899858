//! Certification Types - Level 1 Foundation Types
//!
//! Pure data structures for the certification history of a notified body
//! working under MID Modules B and D. The generator, the CSV layer, the
//! validator and the relational loader all speak in these types.
//!
//! ## Contents
//!
//! - Categorical labels (manufacturer size, sector, instrument, module, risk,
//!   audit status, failure reason) with their exact CSV/database spelling
//! - Identifier formats (`CLI####`, `APP#####`, `AUD#####`)
//! - The four record types: [`Client`], [`Application`],
//!   [`CertificationResult`], [`AuditEvent`]
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - distributions, invariants and checks live in `mid-cert`
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every record round-trips through CSV with serde

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// LABEL ENUMS
// ============================================================================

/// A label that is not part of a categorical domain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct LabelError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of text labels.
///
/// Generates `ALL`, `as_str`, `Display`, `FromStr` and string-based serde
/// impls so the CSV spelling lives in exactly one place.
macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Label as written in CSV files and database columns
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = LabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(LabelError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as Deserialize>::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

label_enum! {
    /// Manufacturer size class; SMEs tend to have less mature quality systems
    pub enum ManufacturerSize("manufacturer size") {
        Sme => "SME",
        Large => "Large",
    }
}

label_enum! {
    /// Market sector of a client
    pub enum Sector("sector") {
        Energy => "Energy",
        Utilities => "Utilities",
        RetailFuel => "Retail Fuel",
        Transportation => "Transportation",
        MultiSector => "Multi-sector",
    }
}

label_enum! {
    /// Measuring instrument submitted for certification
    pub enum InstrumentType("instrument type") {
        GasMeter => "Gas Meter",
        ElectricityMeter => "Electricity Meter",
        WaterMeter => "Water Meter",
        Dispenser => "Dispenser",
        Taximeter => "Taximeter",
    }
}

label_enum! {
    /// MID conformity assessment module
    pub enum MidModule("MID module") {
        /// EU-type examination (design / technical file)
        B => "B",
        /// Quality assurance of the production process
        D => "D",
    }
}

label_enum! {
    pub enum RiskClass("risk class") {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
}

label_enum! {
    /// Outcome of a single audit event
    pub enum AuditStatus("audit status") {
        Pass => "PASS",
        Fail => "FAIL",
        Pending => "PENDING",
    }
}

label_enum! {
    /// Known audit failure reasons.
    ///
    /// Declaration order is the enumeration order used to break ranking ties:
    /// Module B (technical file) reasons first, then Module D (QMS) reasons.
    pub enum FailureReason("failure reason") {
        TechnicalFileIncomplete => "Technical file incomplete",
        DocumentationInconsistencies => "Documentation inconsistencies",
        TestReportGaps => "Test report gaps",
        MetrologicalRequirementsUnclear => "Metrological requirements unclear",
        SoftwareDocumentationMissing => "Software documentation missing",
        DurabilityEvidenceInsufficient => "Durability evidence insufficient",
        MarkingLabellingNonCompliant => "Marking/labelling non-compliant",
        EmcTestResultsMissing => "EMC test results missing",
        TrainingRecordsMissing => "Training records missing",
        InternalAuditGaps => "Internal audit gaps",
        CalibrationRecordsOutdated => "Calibration records outdated",
        NonConformanceHandlingUnclear => "Non-conformance handling unclear",
        ProductionProcessNotDocumented => "Production process not documented",
        SupplierControlInsufficient => "Supplier control insufficient",
        ManagementReviewIncomplete => "Management review incomplete",
        CorrectiveActionRecordsMissing => "Corrective action records missing",
    }
}

impl FailureReason {
    /// Module whose audits raise this finding
    pub fn module(&self) -> MidModule {
        use FailureReason::*;
        match self {
            TechnicalFileIncomplete
            | DocumentationInconsistencies
            | TestReportGaps
            | MetrologicalRequirementsUnclear
            | SoftwareDocumentationMissing
            | DurabilityEvidenceInsufficient
            | MarkingLabellingNonCompliant
            | EmcTestResultsMissing => MidModule::B,
            _ => MidModule::D,
        }
    }

    /// Reasons belonging to one module, in enumeration order
    pub fn for_module(module: MidModule) -> impl Iterator<Item = FailureReason> {
        Self::ALL.iter().copied().filter(move |r| r.module() == module)
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Highest client number that fits `CLI####`
pub const MAX_CLIENT_NUMBER: u32 = 9_999;
/// Highest application number that fits `APP#####`
pub const MAX_APPLICATION_NUMBER: u32 = 99_999;
/// Highest audit number that fits `AUD#####`
pub const MAX_AUDIT_NUMBER: u32 = 99_999;

pub fn client_id(n: u32) -> String {
    format!("CLI{n:04}")
}

pub fn application_id(n: u32) -> String {
    format!("APP{n:05}")
}

pub fn audit_id(n: u32) -> String {
    format!("AUD{n:05}")
}

// ============================================================================
// RECORDS
// ============================================================================

/// Manufacturer dimension (`clients.csv`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub company_name: String,
    pub manufacturer_size: ManufacturerSize,
    pub sector: Sector,
}

/// One certification case (`applications.csv`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub application_id: String,
    pub client_id: String,
    pub submission_date: NaiveDate,
    pub instrument_type: InstrumentType,
    pub mid_module: MidModule,
    pub risk_class: RiskClass,
}

/// Outcome of an application, 1:1 by `application_id` (`certification_results.csv`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationResult {
    pub application_id: String,
    /// Written as `0`/`1`
    #[serde(with = "flag")]
    pub passed_first_time: bool,
    pub total_revisions: u32,
    /// `None` while the certification is still pending
    pub certification_date: Option<NaiveDate>,
}

impl CertificationResult {
    pub fn is_pending(&self) -> bool {
        self.certification_date.is_none()
    }
}

/// A single audit of an application (`audit_results.csv`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub audit_id: String,
    pub application_id: String,
    pub audit_date: NaiveDate,
    pub audit_status: AuditStatus,
    /// Present iff `audit_status` is FAIL
    pub failure_reason: Option<FailureReason>,
}

/// `0`/`1` integer encoding for boolean flags
pub mod flag {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(D::Error::custom(format!("expected 0 or 1, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_back() {
        for sector in Sector::ALL {
            assert_eq!(sector.as_str().parse::<Sector>().unwrap(), *sector);
        }
        assert_eq!("Retail Fuel".parse::<Sector>().unwrap(), Sector::RetailFuel);
        assert_eq!(
            "Marking/labelling non-compliant".parse::<FailureReason>().unwrap(),
            FailureReason::MarkingLabellingNonCompliant
        );
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let err = "Huge".parse::<ManufacturerSize>().unwrap_err();
        assert_eq!(err.kind, "manufacturer size");
        assert_eq!(err.to_string(), "unknown manufacturer size: 'Huge'");
        assert!("pass".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn test_failure_reasons_split_by_module() {
        let b: Vec<_> = FailureReason::for_module(MidModule::B).collect();
        let d: Vec<_> = FailureReason::for_module(MidModule::D).collect();
        assert_eq!(b.len(), 8);
        assert_eq!(d.len(), 8);
        assert_eq!(b[0], FailureReason::TechnicalFileIncomplete);
        assert_eq!(d[0], FailureReason::TrainingRecordsMissing);
        assert!(FailureReason::TestReportGaps < FailureReason::InternalAuditGaps);
    }

    #[test]
    fn test_id_formats() {
        assert_eq!(client_id(7), "CLI0007");
        assert_eq!(application_id(42), "APP00042");
        assert_eq!(audit_id(12345), "AUD12345");
    }

    #[test]
    fn test_record_serializes_with_csv_labels() {
        let result = CertificationResult {
            application_id: application_id(1),
            passed_first_time: true,
            total_revisions: 0,
            certification_date: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["passed_first_time"], 1);
        assert!(json["certification_date"].is_null());

        let event = AuditEvent {
            audit_id: audit_id(1),
            application_id: application_id(1),
            audit_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            audit_status: AuditStatus::Fail,
            failure_reason: Some(FailureReason::EmcTestResultsMissing),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["audit_date"], "2024-03-09");
        assert_eq!(json["audit_status"], "FAIL");
        assert_eq!(json["failure_reason"], "EMC test results missing");
    }
}
