//! Marker pattern generation seam.
//!
//! Pattern generation is an external collaborator: the engine only needs a
//! deterministic mapping from text to a square grid of dark/light modules.
//! Deployments plug in a real positional-code generator; [`HashPattern`]
//! provides a deterministic stand-in with a fixed module count.

/// A square grid of dark/light modules produced for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGrid {
    modules: u32,
    dark: Vec<bool>,
}

impl PatternGrid {
    /// Build a grid from a module count and row-major darkness flags.
    ///
    /// # Panics
    ///
    /// Panics if `dark.len() != modules * modules`.
    #[must_use]
    pub fn new(modules: u32, dark: Vec<bool>) -> Self {
        assert_eq!(dark.len(), (modules * modules) as usize);
        Self { modules, dark }
    }

    /// Number of modules along one edge.
    #[must_use]
    pub fn modules(&self) -> u32 {
        self.modules
    }

    /// Whether the module at (col, row) is dark.
    #[must_use]
    pub fn is_dark(&self, col: u32, row: u32) -> bool {
        if col >= self.modules || row >= self.modules {
            return false;
        }
        self.dark[(row * self.modules + col) as usize]
    }

    /// Iterate over the dark modules as (col, row) pairs.
    pub fn dark_modules(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let modules = self.modules;
        self.dark
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(move |(i, _)| {
                let i = u32::try_from(i).unwrap_or(u32::MAX);
                (i % modules, i / modules)
            })
    }
}

/// Deterministic text → module-grid generator.
///
/// Same input must always yield the same module count and pattern; both page
/// markers rely on this to share a single cell size.
pub trait PatternGenerator {
    /// Generate the module grid encoding `text`.
    fn generate(&self, text: &str) -> PatternGrid;
}

/// Hash-derived placeholder generator with a fixed module count.
///
/// Not scannable; it exists so layout, sizing and export can run without a
/// real code generator attached.
#[derive(Debug, Clone, Copy)]
pub struct HashPattern {
    modules: u32,
}

impl HashPattern {
    /// Create a generator producing `modules` x `modules` grids.
    #[must_use]
    pub fn new(modules: u32) -> Self {
        Self { modules }
    }
}

impl Default for HashPattern {
    fn default() -> Self {
        // 21 matches the smallest standard positional code.
        Self::new(21)
    }
}

impl PatternGenerator for HashPattern {
    fn generate(&self, text: &str) -> PatternGrid {
        let mut dark = Vec::with_capacity((self.modules * self.modules) as usize);
        for row in 0..self.modules {
            for col in 0..self.modules {
                dark.push(fnv1a(text, col, row) & 1 == 1);
            }
        }
        PatternGrid::new(self.modules, dark)
    }
}

fn fnv1a(text: &str, col: u32, row: u32) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text
        .bytes()
        .chain(col.to_le_bytes())
        .chain(row.to_le_bytes())
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
