// File: deid-core/src/validators.rs
//! Programmatic validation functions for specific identifier types.
//!
//! This module provides additional validation logic beyond regular
//! expression matching for identifiers such as the Mexican CURP, the
//! Brazilian CPF, and the US SSN. These functions help reduce false
//! positives by applying structural checks and check-digit arithmetic.
//!
//! License: MIT OR APACHE 2.0

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// The CURP check-digit alphabet. Position in this string is the numeric
/// value of the character during check-digit computation.
const CURP_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNÑOPQRSTUVWXYZ";

fn curp_char_value(c: char) -> Option<u32> {
    CURP_ALPHABET.chars().position(|a| a == c).map(|i| i as u32)
}

/// Computes the CURP check digit over the first 17 characters.
///
/// Each character's alphabet value is weighted by its distance from the
/// end (18 down to 2); the check digit is `(10 - sum mod 10) mod 10`.
pub fn curp_check_digit(prefix: &str) -> Option<u32> {
    let chars: Vec<char> = prefix.chars().collect();
    if chars.len() < 17 {
        return None;
    }
    let mut sum: u32 = 0;
    for (i, c) in chars.iter().take(17).enumerate() {
        let value = curp_char_value(*c)?;
        sum += value * (18 - i as u32);
    }
    Some((10 - (sum % 10)) % 10)
}

/// Helper function to validate a Mexican CURP.
///
/// Checks the 18-character structure (initials, birth date, sex marker,
/// state and consonant block, homonymy differentiator) and verifies the
/// final check digit.
///
/// # Arguments
///
/// * `curp` - The CURP string slice to validate, e.g. "GOGM850312MDFNRR05".
///
/// # Returns
///
/// `true` if the CURP passes structural and check-digit validation,
/// `false` otherwise.
pub fn is_valid_curp(curp: &str) -> bool {
    let chars: Vec<char> = curp.chars().collect();
    if chars.len() != 18 {
        return false;
    }

    if !chars[0..4].iter().all(|c| c.is_ascii_uppercase() || *c == 'Ñ') {
        return false;
    }

    // Byte indexing is unsafe here: the initials may contain 'Ñ'.
    let date_part: String = chars[4..10].iter().collect();
    if !date_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let month: u32 = date_part[2..4].parse().unwrap_or(0);
    let day: u32 = date_part[4..6].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return false;
    }

    if !matches!(chars[10], 'H' | 'M' | 'X') {
        return false;
    }

    if !chars[11..16].iter().all(|c| c.is_ascii_uppercase() || *c == 'Ñ') {
        return false;
    }

    // Position 16 is the homonymy differentiator (digit before 2000,
    // letter from 2000 on); position 17 is the check digit.
    if !chars[16].is_ascii_alphanumeric() {
        return false;
    }
    let Some(expected) = chars[17].to_digit(10) else {
        return false;
    };

    curp_check_digit(curp) == Some(expected)
}

/// Helper function to validate a Brazilian CPF.
///
/// Strips formatting, rejects degenerate all-same-digit values, and
/// verifies both mod-11 check digits.
///
/// # Arguments
///
/// * `cpf` - The CPF string slice, formatted ("529.982.247-25") or bare.
pub fn is_valid_cpf(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let check = |take: usize| -> u32 {
        let sum: u32 = digits
            .iter()
            .take(take)
            .enumerate()
            .map(|(i, d)| d * (take as u32 + 1 - i as u32))
            .sum();
        let rem = (sum * 10) % 11;
        if rem == 10 {
            0
        } else {
            rem
        }
    };

    check(9) == digits[9] && check(10) == digits[10]
}

/// Helper function to validate SSN based on US Social Security
/// Administration rules.
///
/// Validates the structural components against known invalid patterns.
///
/// # Arguments
///
/// * `ssn` - The SSN string slice to validate. Expected format "XXX-XX-XXXX".
pub fn is_valid_ssn(ssn: &str) -> bool {
    let mut parts = ssn.split('-');

    let (Some(area), Some(group), Some(serial), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    if area.len() != 3 || group.len() != 2 || serial.len() != 4 {
        return false;
    }

    let Some(area_num) = area.parse::<u16>().ok() else { return false };
    let Some(group_num) = group.parse::<u8>().ok() else { return false };
    let Some(serial_num) = serial.parse::<u16>().ok() else { return false };

    let invalid_area = (area_num == 0) || (area_num == 666) || (area_num >= 900);
    let invalid_group = group_num == 0;
    let invalid_serial = serial_num == 0;

    !(invalid_area || invalid_group || invalid_serial)
}

/// Validates a number using the Luhn algorithm.
///
/// # Arguments
///
/// * `num_str` - A string slice containing only digits.
pub fn is_valid_luhn(num_str: &str) -> bool {
    let mut sum = 0;
    let mut alternate = false;

    for c in num_str.chars().rev() {
        let Some(mut digit) = c.to_digit(10) else { return false };

        if alternate {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        alternate = !alternate;
    }

    sum % 10 == 0
}

/// Helper function to validate a 15-digit IMEI via the Luhn checksum.
pub fn is_valid_imei(imei: &str) -> bool {
    imei.len() == 15 && imei.chars().all(|c| c.is_ascii_digit()) && is_valid_luhn(imei)
}

/// Plausibility check for a 17-character VIN candidate: the pattern
/// already excludes I, O, and Q; a real VIN mixes letters and digits.
pub fn is_plausible_vin(vin: &str) -> bool {
    vin.len() == 17
        && vin.chars().any(|c| c.is_ascii_uppercase())
        && vin.chars().any(|c| c.is_ascii_digit())
}

// Capitalized clinical terms that the generic name matcher would
// otherwise flag as person names.
static CLINICAL_STOP_TERMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set = HashSet::new();
    set.extend([
        "diabetes mellitus",
        "hipertensión arterial",
        "hipertension arterial",
        "insuficiencia renal",
        "insuficiencia cardiaca",
        "insuficiencia cardíaca",
        "enfermedad pulmonar",
        "accidente cerebrovascular",
        "tomografía computarizada",
        "tomografia computarizada",
        "resonancia magnética",
        "resonancia magnetica",
        "presión arterial",
        "presion arterial",
        "frecuencia cardiaca",
        "rayos equis",
        "urgencias adultos",
    ]);
    set
});

/// Returns true if a candidate name span is actually a known capitalized
/// clinical term and must not be treated as a person name.
pub fn is_clinical_stop_term(candidate: &str) -> bool {
    let normalized = candidate.trim().to_lowercase();
    CLINICAL_STOP_TERMS.contains(normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curp_check_digit_matches_known_value() {
        // GOGM850312MDFNRR0 + computed digit 5.
        assert_eq!(curp_check_digit("GOGM850312MDFNRR0"), Some(5));
        assert!(is_valid_curp("GOGM850312MDFNRR05"));
    }

    #[test]
    fn test_curp_rejects_wrong_check_digit() {
        assert!(!is_valid_curp("GOGM850312MDFNRR04"));
    }

    #[test]
    fn test_curp_rejects_bad_structure() {
        assert!(!is_valid_curp("GOGM851312MDFNRR05")); // month 13
        assert!(!is_valid_curp("GOGM850300MDFNRR05")); // day 00
        assert!(!is_valid_curp("GOGM850312ZDFNRR05")); // sex marker Z
        assert!(!is_valid_curp("GOGM850312MDFNRR5")); // 17 chars
    }

    #[test]
    fn test_cpf_accepts_valid_check_digits() {
        assert!(is_valid_cpf("529.982.247-25"));
        assert!(is_valid_cpf("52998224725"));
    }

    #[test]
    fn test_cpf_rejects_bad_check_digits_and_degenerates() {
        assert!(!is_valid_cpf("529.982.247-26"));
        assert!(!is_valid_cpf("111.111.111-11"));
        assert!(!is_valid_cpf("1234567890"));
    }

    #[test]
    fn test_ssn_structural_rules() {
        assert!(is_valid_ssn("123-45-6789"));
        assert!(!is_valid_ssn("000-45-6789"));
        assert!(!is_valid_ssn("666-45-6789"));
        assert!(!is_valid_ssn("900-45-6789"));
        assert!(!is_valid_ssn("123-00-6789"));
        assert!(!is_valid_ssn("123-45-0000"));
        assert!(!is_valid_ssn("123456789"));
    }

    #[test]
    fn test_imei_luhn() {
        assert!(is_valid_imei("490154203237518"));
        assert!(!is_valid_imei("490154203237519"));
        assert!(!is_valid_imei("49015420323751"));
    }

    #[test]
    fn test_vin_plausibility() {
        assert!(is_plausible_vin("3VWFE21C04M000001"));
        assert!(!is_plausible_vin("AAAAAAAAAAAAAAAAA")); // no digits
        assert!(!is_plausible_vin("11111111111111111")); // no letters
    }

    #[test]
    fn test_clinical_stop_terms() {
        assert!(is_clinical_stop_term("Diabetes Mellitus"));
        assert!(is_clinical_stop_term(" Hipertensión Arterial "));
        assert!(!is_clinical_stop_term("María González"));
    }
}
