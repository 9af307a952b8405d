use crate::query::parser::filter::LocationFilter;
use crate::query::schema::Variant;

/// Determine whether the `Variant` passes the location filter.
///
/// Regions, genes, ids and cross-references are alternatives: matching any
/// of them suffices.
pub fn passes(filter: &LocationFilter, variant: &Variant) -> bool {
    if filter.is_empty() {
        return true;
    }
    let in_region = filter
        .all_regions()
        .iter()
        .any(|r| r.overlaps(&variant.chromosome, variant.start, variant.end));
    let res = in_region
        || filter.variant_ids.iter().any(|id| id.matches(variant))
        || (!filter.genes.is_empty()
            && variant
                .gene_names()
                .iter()
                .any(|g| filter.genes.iter().any(|f| f == g)))
        || (!filter.xrefs.is_empty()
            && variant
                .annotation
                .iter()
                .flat_map(|a| a.xrefs.iter())
                .chain(variant.names.iter())
                .any(|x| filter.xrefs.contains(x)));
    if !res {
        tracing::trace!("variant {} fails location filter", variant);
    }
    res
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;
    use crate::query::schema::data::{ConsequenceType, VariantAnnotation, VariantCoordinate};
    use crate::query::schema::Region;

    fn variant() -> Variant {
        let mut variant = Variant::new("chr1", 150, "A", "T");
        variant.annotation = Some(VariantAnnotation {
            consequence_types: vec![ConsequenceType {
                gene_name: "BRCA2".into(),
                ..Default::default()
            }],
            xrefs: vec!["rs123".into()],
        });
        variant
    }

    #[rstest]
    #[case(vec![Region::new("1", 100, 200)], vec![], vec![], true)]
    #[case(vec![Region::new("1", 151, 200)], vec![], vec![], false)]
    #[case(vec![Region::whole_chrom("2")], vec!["BRCA2"], vec![], true)]
    #[case(vec![], vec!["TP53"], vec!["rs123"], true)]
    #[case(vec![], vec!["TP53"], vec!["rs9"], false)]
    fn passes_location(
        #[case] regions: Vec<Region>,
        #[case] genes: Vec<&str>,
        #[case] xrefs: Vec<&str>,
        #[case] expected: bool,
    ) {
        let filter = LocationFilter {
            regions,
            genes: genes.into_iter().map(String::from).collect(),
            xrefs: xrefs.into_iter().map(String::from).collect(),
            ..Default::default()
        };
        assert_eq!(passes(&filter, &variant()), expected);
    }

    #[test]
    fn passes_variant_id() {
        let filter = LocationFilter {
            variant_ids: vec![VariantCoordinate::parse("1:150:A:T").expect("valid id")],
            ..Default::default()
        };
        assert!(passes(&filter, &variant()));
    }
}
