//! Common functionality.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Definition of canonical chromosome names.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "M",
];

/// Canonicalize a chromosome name: strip a `chr` prefix and map mitochondrial
/// aliases to `M`.
///
/// Unknown contigs are returned without their prefix but otherwise unchanged.
pub fn canonicalize(chrom: &str) -> String {
    let stripped = if chrom.len() > 3 && chrom[..3].eq_ignore_ascii_case("chr") {
        &chrom[3..]
    } else {
        chrom
    };
    match stripped {
        "x" => "X".to_string(),
        "y" => "Y".to_string(),
        "m" | "mt" | "MT" | "Mt" => "M".to_string(),
        _ => stripped.to_string(),
    }
}

/// Index of a chromosome in `CHROMS`, if it is a canonical one.
pub fn chrom_index(chrom: &str) -> Option<usize> {
    CHROMS.iter().position(|c| *c == canonicalize(chrom))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("1", "1")]
    #[case("chr1", "1")]
    #[case("CHRX", "X")]
    #[case("chrx", "X")]
    #[case("MT", "M")]
    #[case("chrM", "M")]
    #[case("GL000220.1", "GL000220.1")]
    fn canonicalize(#[case] chrom: &str, #[case] expected: &str) {
        assert_eq!(super::canonicalize(chrom), expected);
    }

    #[test]
    fn chrom_index() {
        assert_eq!(super::chrom_index("chr2"), Some(1));
        assert_eq!(super::chrom_index("Y"), Some(23));
        assert_eq!(super::chrom_index("chrMT"), Some(24));
        assert_eq!(super::chrom_index("unplaced"), None);
    }
}
