// deid-core/src/category.rs
//! The HIPAA Safe Harbor identifier categories.
//!
//! Safe Harbor enumerates 18 classes of protected health identifiers that
//! must be removed for a data set to be considered de-identified. This
//! module models them as a closed enum so that pattern rules, detected
//! spans, tokens, and summary counts all speak the same vocabulary.
//!
//! License: MIT OR APACHE 2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Safe Harbor identifier class.
///
/// The wire representation (serde and [`PhiCategory::as_str`]) is the
/// SCREAMING_SNAKE_CASE name used in token text (`[NAME_1]`), summary
/// `byType` keys, and the declarative pattern configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhiCategory {
    Name,
    GeographicSubdivision,
    Address,
    PostalCode,
    /// All date elements except year (birth, admission, discharge, death).
    Date,
    Phone,
    Fax,
    Email,
    /// CURP, CPF, SSN and equivalent national identity numbers.
    NationalId,
    MedicalRecordNumber,
    HealthPlanId,
    AccountNumber,
    CertificateLicenseNumber,
    VehicleId,
    DeviceId,
    Url,
    IpAddress,
    BiometricId,
    PhotoReference,
    OtherUniqueId,
}

/// Every category, in declaration order. Useful for coverage checks.
pub const ALL_CATEGORIES: [PhiCategory; 20] = [
    PhiCategory::Name,
    PhiCategory::GeographicSubdivision,
    PhiCategory::Address,
    PhiCategory::PostalCode,
    PhiCategory::Date,
    PhiCategory::Phone,
    PhiCategory::Fax,
    PhiCategory::Email,
    PhiCategory::NationalId,
    PhiCategory::MedicalRecordNumber,
    PhiCategory::HealthPlanId,
    PhiCategory::AccountNumber,
    PhiCategory::CertificateLicenseNumber,
    PhiCategory::VehicleId,
    PhiCategory::DeviceId,
    PhiCategory::Url,
    PhiCategory::IpAddress,
    PhiCategory::BiometricId,
    PhiCategory::PhotoReference,
    PhiCategory::OtherUniqueId,
];

impl PhiCategory {
    /// The canonical SCREAMING_SNAKE_CASE name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhiCategory::Name => "NAME",
            PhiCategory::GeographicSubdivision => "GEOGRAPHIC_SUBDIVISION",
            PhiCategory::Address => "ADDRESS",
            PhiCategory::PostalCode => "POSTAL_CODE",
            PhiCategory::Date => "DATE",
            PhiCategory::Phone => "PHONE",
            PhiCategory::Fax => "FAX",
            PhiCategory::Email => "EMAIL",
            PhiCategory::NationalId => "NATIONAL_ID",
            PhiCategory::MedicalRecordNumber => "MEDICAL_RECORD_NUMBER",
            PhiCategory::HealthPlanId => "HEALTH_PLAN_ID",
            PhiCategory::AccountNumber => "ACCOUNT_NUMBER",
            PhiCategory::CertificateLicenseNumber => "CERTIFICATE_LICENSE_NUMBER",
            PhiCategory::VehicleId => "VEHICLE_ID",
            PhiCategory::DeviceId => "DEVICE_ID",
            PhiCategory::Url => "URL",
            PhiCategory::IpAddress => "IP_ADDRESS",
            PhiCategory::BiometricId => "BIOMETRIC_ID",
            PhiCategory::PhotoReference => "PHOTO_REFERENCE",
            PhiCategory::OtherUniqueId => "OTHER_UNIQUE_ID",
        }
    }
}

impl fmt::Display for PhiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhiCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown PHI category '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_round_trips_through_from_str() {
        for category in ALL_CATEGORIES {
            assert_eq!(category.as_str().parse::<PhiCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&PhiCategory::MedicalRecordNumber).unwrap();
        assert_eq!(json, "\"MEDICAL_RECORD_NUMBER\"");
        let back: PhiCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PhiCategory::MedicalRecordNumber);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!("FAVORITE_COLOR".parse::<PhiCategory>().is_err());
    }
}
