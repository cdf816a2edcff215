//! SKU catalog (spec §6 "SKU catalog (authoritative)"): series codes map to
//! scheduling hints (`SkuSeries::scheduling_hints`, spec §4.3), and a numeric
//! suffix on the series maps to a fixed (memory_mb, vcpu, storage_gb) tuple.
//!
//! The spec gives one worked example — `D2 → 4096 MB, 2 vCPU, 50 GB` — and
//! leaves the rest of the table implicit ("per a fixed table"). The
//! generating formula used here, `memory_mb = base_mb(series) * n`,
//! `vcpu = n * vcpu_factor(series)`, `storage_gb = 25 * n`, reproduces that
//! exact D2 entry and is applied uniformly across sizes and series so every
//! series keeps the stated character: B (burstable) gets less memory per
//! vCPU than D, E (memory) gets more, F (compute) gets more vCPU per unit.

use crate::model::{Sku, SkuSeries};

/// Allowed numeric suffixes (spec §6 "numeric suffix (1, 2, 4, 8, 16, 32, 64)").
pub const SIZES: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

fn memory_mb_per_unit(series: SkuSeries) -> i64 {
    match series {
        SkuSeries::B => 1024,
        SkuSeries::D => 2048,
        SkuSeries::E => 4096,
        SkuSeries::F => 2048,
    }
}

fn vcpu_per_unit(series: SkuSeries) -> f64 {
    match series {
        SkuSeries::F => 2.0,
        _ => 1.0,
    }
}

const STORAGE_GB_PER_UNIT: i64 = 25;

/// Parses a catalog SKU id like `"D2"` into its resource envelope. Returns
/// `None` for `"custom"` (handled separately by the caller, which must
/// supply explicit resource fields) or any id outside the fixed catalog.
pub fn lookup(sku_id: &str) -> Option<Sku> {
    if sku_id.eq_ignore_ascii_case("custom") {
        return None;
    }
    let (series_char, size_str) = sku_id.split_at(1);
    let series = match series_char.to_ascii_uppercase().as_str() {
        "B" => SkuSeries::B,
        "D" => SkuSeries::D,
        "E" => SkuSeries::E,
        "F" => SkuSeries::F,
        _ => return None,
    };
    let n: u32 = size_str.parse().ok()?;
    if !SIZES.contains(&n) {
        return None;
    }
    let n = n as i64;
    Some(Sku {
        id: sku_id.to_string(),
        series: Some(series),
        memory_mb: memory_mb_per_unit(series) * n,
        vcpu: vcpu_per_unit(series) * n as f64,
        storage_gb: STORAGE_GB_PER_UNIT * n,
        is_custom: false,
    })
}

/// Builds a `custom` SKU from caller-supplied resource fields (spec §6
/// "`custom` accepts user-specified values").
pub fn custom(memory_mb: i64, vcpu: f64, storage_gb: i64) -> Sku {
    Sku { id: "custom".to_string(), series: None, memory_mb, vcpu, storage_gb, is_custom: true }
}

/// The full fixed catalog, for `GET /skus`.
pub fn catalog() -> Vec<Sku> {
    let mut skus = Vec::with_capacity(SIZES.len() * 4);
    for series in [SkuSeries::B, SkuSeries::D, SkuSeries::E, SkuSeries::F] {
        for n in SIZES {
            skus.push(lookup(&format!("{series}{n}")).expect("generated id is always valid"));
        }
    }
    skus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d2_matches_the_worked_example_in_the_spec() {
        let sku = lookup("D2").unwrap();
        assert_eq!(sku.memory_mb, 4096);
        assert_eq!(sku.vcpu, 2.0);
        assert_eq!(sku.storage_gb, 50);
    }

    #[test]
    fn custom_is_not_in_the_fixed_catalog() {
        assert!(lookup("custom").is_none());
        assert!(lookup("CUSTOM").is_none());
    }

    #[test]
    fn unknown_series_or_size_is_rejected() {
        assert!(lookup("Z2").is_none());
        assert!(lookup("D3").is_none());
    }

    #[test]
    fn catalog_has_four_series_times_seven_sizes() {
        assert_eq!(catalog().len(), 28);
    }
}
