//! Compatibility levels: increasingly descriptive sets of attributes a
//! scheduler (or registry) may match a binary on.

use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompatibilityLevel {
    Platform,
    Os,
    OsVersion,
    Descriptive,
    Mpi,
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityLevel::Platform => write!(f, "platform"),
            CompatibilityLevel::Os => write!(f, "os"),
            CompatibilityLevel::OsVersion => write!(f, "os-version"),
            CompatibilityLevel::Descriptive => write!(f, "descriptive"),
            CompatibilityLevel::Mpi => write!(f, "mpi"),
        }
    }
}

impl FromStr for CompatibilityLevel {
    type Err = ();

    fn from_str(input: &str) -> Result<CompatibilityLevel, Self::Err> {
        match input {
            "platform" => Ok(CompatibilityLevel::Platform),
            "os" => Ok(CompatibilityLevel::Os),
            "os-version" => Ok(CompatibilityLevel::OsVersion),
            "descriptive" => Ok(CompatibilityLevel::Descriptive),
            "mpi" => Ok(CompatibilityLevel::Mpi),
            _ => Err(()),
        }
    }
}

/// Columns of the compatibility gradient, one per attribute.
pub const GRADIENT_FEATURES: [&str; 5] = [
    "io.archspec.cpu.target",
    "org.supercontainers.os.vendor",
    "org.supercontainers.os.version",
    "org.supercontainers.hardware.gpu.available",
    "mpi.implementation",
];

impl CompatibilityLevel {
    pub fn iter_variants() -> std::slice::Iter<'static, CompatibilityLevel> {
        static VARIANTS: [CompatibilityLevel; 5] = [
            CompatibilityLevel::Platform,
            CompatibilityLevel::Os,
            CompatibilityLevel::OsVersion,
            CompatibilityLevel::Descriptive,
            CompatibilityLevel::Mpi,
        ];
        VARIANTS.iter()
    }

    /// The levels compared in the compatibility gradient.
    pub fn gradient_levels() -> std::slice::Iter<'static, CompatibilityLevel> {
        static VARIANTS: [CompatibilityLevel; 4] = [
            CompatibilityLevel::Platform,
            CompatibilityLevel::Os,
            CompatibilityLevel::OsVersion,
            CompatibilityLevel::Descriptive,
        ];
        VARIANTS.iter()
    }

    /// # Description
    ///
    /// Requirement groups and the attributes each level matches on. Group
    /// names are the ones emitted in jobspec requirements, attribute names
    /// the keys of a `CompatibilitySpec`.
    pub fn attribute_groups(&self) -> Vec<(&'static str, Vec<&'static str>)> {
        let platform = ("io.archspec", vec!["cpu.target"]);
        match self {
            CompatibilityLevel::Platform => vec![platform],
            CompatibilityLevel::Os => vec![platform, ("os", vec!["os.name", "os.vendor"])],
            CompatibilityLevel::OsVersion => vec![
                platform,
                ("os", vec!["os.name", "os.vendor", "os.release"]),
            ],
            CompatibilityLevel::Descriptive => vec![
                platform,
                ("hardware", vec!["hardware.gpu.available"]),
                ("os", vec!["os.name", "os.release", "os.vendor"]),
            ],
            CompatibilityLevel::Mpi => vec![
                platform,
                ("hardware", vec!["hardware.gpu.available"]),
                ("os", vec!["os.name", "os.release", "os.vendor"]),
                ("mpi", vec!["mpi.implementation", "mpi.version"]),
            ],
        }
    }

    /// Which of the `GRADIENT_FEATURES` a level takes into account.
    pub fn gradient_vector(&self) -> [f64; 5] {
        match self {
            CompatibilityLevel::Platform => [1.0, 0.0, 0.0, 0.0, 0.0],
            CompatibilityLevel::Os => [1.0, 1.0, 0.0, 0.0, 0.0],
            CompatibilityLevel::OsVersion => [1.0, 1.0, 1.0, 0.0, 0.0],
            CompatibilityLevel::Descriptive => [1.0, 1.0, 1.0, 1.0, 0.0],
            CompatibilityLevel::Mpi => [1.0, 1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Cosine distance between two vectors. Zero vectors are at distance one.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

/// # Description
///
/// Pairwise cosine distances between the gradient vectors of `levels`. The
/// diagonal is forced to exactly zero so rounding never shows up on it.
pub fn cosine_distance_matrix(levels: &[CompatibilityLevel]) -> Vec<Vec<f64>> {
    levels
        .iter()
        .enumerate()
        .map(|(i, a)| {
            levels
                .iter()
                .enumerate()
                .map(|(j, b)| {
                    if i == j {
                        0.0
                    } else {
                        cosine_distance(&a.gradient_vector(), &b.gradient_vector())
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_round_trip_names() {
        for level in CompatibilityLevel::iter_variants() {
            assert_eq!(level.to_string().parse::<CompatibilityLevel>(), Ok(*level));
        }
    }

    #[test]
    fn test_levels_are_cumulative() {
        let count = |level: CompatibilityLevel| -> usize {
            level
                .attribute_groups()
                .iter()
                .map(|(_, attrs)| attrs.len())
                .sum()
        };

        let counts: Vec<usize> = CompatibilityLevel::iter_variants()
            .map(|level| count(*level))
            .collect();
        assert_eq!(counts, vec![1, 3, 4, 5, 7]);
    }

    #[test]
    fn test_cosine_distance_matrix() {
        let levels: Vec<CompatibilityLevel> =
            CompatibilityLevel::gradient_levels().copied().collect();
        let dist = cosine_distance_matrix(&levels);

        assert_eq!(dist.len(), 4);
        for (i, row) in dist.iter().enumerate() {
            assert_eq!(row[i], 0.0);
            for (j, value) in row.iter().enumerate() {
                assert!((value - dist[j][i]).abs() < 1e-12);
            }
        }

        // platform vs os: 1 - 1/sqrt(2)
        let expected = 1.0 - 1.0 / 2f64.sqrt();
        assert!((dist[0][1] - expected).abs() < 1e-12);
        // distances grow as levels move apart
        assert!(dist[0][3] > dist[0][2]);
        assert!(dist[0][2] > dist[0][1]);
    }

    #[test]
    fn test_cosine_distance_of_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
