// Relations module
// Pairwise similarity between indexed table schemas, for inspecting an index


use std::fmt;

use itertools::Itertools;

use crate::Result;
use crate::index::LoadedIndex;

/// Questions run by `inspect` when none are given
pub const DEFAULT_PROBES: &[&str] = &[
    "customer information",
    "sales data",
    "product details",
    "order history",
    "payment records",
];

/// Number of tables shown per probe
pub const PROBE_DEPTH: usize = 3;

/// Heat map band for a cosine similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityBand {
    Itself,
    High,
    Medium,
    Low,
    VeryLow,
}

impl SimilarityBand {
    #[inline]
    pub fn classify(similarity: f32) -> Self {
        if similarity > 0.8 {
            Self::High
        } else if similarity > 0.6 {
            Self::Medium
        } else if similarity > 0.4 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    #[inline]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Itself => "██",
            Self::High => "▓▓",
            Self::Medium => "▒▒",
            Self::Low => "░░",
            Self::VeryLow => "··",
        }
    }

    #[inline]
    pub fn legend() -> &'static str {
        "██ Self  ▓▓ High(>0.8)  ▒▒ Med(>0.6)  ░░ Low(>0.4)  ·· VeryLow"
    }
}

/// Two distinct tables and their cosine similarity
#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub first: String,
    pub second: String,
    pub similarity: f32,
}

/// Cosine similarity of every pair of indexed tables
#[derive(Debug, Clone, PartialEq)]
pub struct RelationMap {
    table_names: Vec<String>,
    matrix: Vec<Vec<f32>>,
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| v / norm).collect()
}

impl RelationMap {
    /// Rows are `(table_name, vector)` in index position order
    ///
    /// A zero vector has similarity 0 with everything but itself.
    #[inline]
    pub fn from_vectors(rows: &[(String, Vec<f32>)]) -> Self {
        let normalized: Vec<Vec<f32>> = rows.iter().map(|(_, v)| normalize(v)).collect();

        let matrix = normalized
            .iter()
            .enumerate()
            .map(|(i, a)| {
                normalized
                    .iter()
                    .enumerate()
                    .map(|(j, b)| {
                        if i == j {
                            1.0
                        } else {
                            a.iter().zip(b).map(|(x, y)| x * y).sum()
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            table_names: rows.iter().map(|(name, _)| name.clone()).collect(),
            matrix,
        }
    }

    #[inline]
    pub async fn from_index(index: &LoadedIndex) -> Result<Self> {
        let rows = index.vectors().reconstruct_all().await?;
        Ok(Self::from_vectors(&rows))
    }

    #[inline]
    pub fn table_names(&self) -> &[String] {
        &self.table_names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table_names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
    }

    #[inline]
    pub fn similarity(&self, i: usize, j: usize) -> Option<f32> {
        self.matrix.get(i)?.get(j).copied()
    }

    #[inline]
    pub fn band(&self, i: usize, j: usize) -> Option<SimilarityBand> {
        if i == j {
            return (i < self.len()).then_some(SimilarityBand::Itself);
        }
        self.similarity(i, j).map(SimilarityBand::classify)
    }

    /// The `n` most similar distinct pairs, most similar first
    ///
    /// Equal similarities keep index order.
    #[inline]
    pub fn top_pairs(&self, n: usize) -> Vec<TablePair> {
        (0..self.len())
            .tuple_combinations()
            .map(|(i, j)| TablePair {
                first: self.table_names[i].clone(),
                second: self.table_names[j].clone(),
                similarity: self.matrix[i][j],
            })
            .sorted_by(|a, b| b.similarity.total_cmp(&a.similarity))
            .take(n)
            .collect()
    }

    /// Heat map rows, ready to print
    #[inline]
    pub fn heatmap(&self) -> HeatMap<'_> {
        HeatMap { map: self }
    }
}

/// Text rendering of a [`RelationMap`]
pub struct HeatMap<'a> {
    map: &'a RelationMap,
}

impl fmt::Display for HeatMap<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    ")?;
        for i in 0..self.map.len() {
            write!(f, "{:3}", i + 1)?;
        }
        writeln!(f)?;

        for (i, name) in self.map.table_names.iter().enumerate() {
            write!(f, "{:2}. ", i + 1)?;
            for j in 0..self.map.len() {
                let glyph = self.map.band(i, j).map_or("  ", SimilarityBand::glyph);
                write!(f, " {}", glyph)?;
            }
            writeln!(f, " {}", name)?;
        }
        Ok(())
    }
}
