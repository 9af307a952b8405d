//! Code for sorting `Variant` records by coordinate.

use std::cmp::Ordering;

use crate::common::chrom_index;
use crate::query::schema::Variant;

/// Compare chromosome names, known chromosomes in karyotypic order first.
pub fn compare_chromosomes(lhs: &str, rhs: &str) -> Ordering {
    match (chrom_index(lhs), chrom_index(rhs)) {
        (Some(l), Some(r)) => l.cmp(&r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => lhs.cmp(rhs),
    }
}

/// Total order on variants: chromosome, start, end, reference, alternate and
/// finally the textual form.
pub fn compare_variants(lhs: &Variant, rhs: &Variant) -> Ordering {
    compare_chromosomes(&lhs.chromosome, &rhs.chromosome)
        .then(lhs.start.cmp(&rhs.start))
        .then(lhs.end.cmp(&rhs.end))
        .then_with(|| lhs.reference.cmp(&rhs.reference))
        .then_with(|| lhs.alternate.cmp(&rhs.alternate))
        .then_with(|| lhs.to_string().cmp(&rhs.to_string()))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sort_by_coordinate() {
        let mut variants = vec![
            Variant::new("X", 5, "A", "C"),
            Variant::new("10", 7, "A", "T"),
            Variant::new("2", 9, "A", "G"),
            Variant::new("2", 9, "A", "C"),
            Variant::new("2", 3, "AT", "A"),
        ];
        variants.sort_by(compare_variants);
        assert_eq!(
            variants.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            vec!["2:3:AT:A", "2:9:A:C", "2:9:A:G", "10:7:A:T", "X:5:A:C"]
        );
    }

    #[test]
    fn unknown_chromosomes_sort_last() {
        assert_eq!(compare_chromosomes("chr1", "GL000192.1"), Ordering::Less);
        assert_eq!(compare_chromosomes("MT", "1"), Ordering::Greater);
    }
}
