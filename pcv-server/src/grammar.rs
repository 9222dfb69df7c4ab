//! Compact encoding expander
//!
//! A compact file is a sequence of lines. Each line is a sequence of columns
//! separated by `,`, and each column is a set of alternatives separated by `|`.
//! Expanding a line produces the Cartesian product of its columns'
//! alternatives, each variant re-joined with `,`. The first column varies
//! slowest, so `a|b,c|d` expands to `a,c`, `a,d`, `b,c`, `b,d`.
//!
//! The output grows exponentially with the number of multi-alternative
//! columns on a line. The encoding is meant for short structured lines, and
//! no limit is imposed here; use [`variant_count`] to size an input before
//! expanding it.

pub const LINE_DELIMITER: char = '\n';
pub const COLUMN_DELIMITER: char = ',';
pub const VALUE_DELIMITER: char = '|';

/// Expand a compact-encoded text into its full content.
///
/// Lines keep their input order and every variant is written on its own line.
/// Text without delimiters is returned unchanged.
pub fn expand(compact: &str) -> String {
    let mut expanded = String::with_capacity(compact.len());

    for (line_index, line) in compact.split(LINE_DELIMITER).enumerate() {
        for (variant_index, variant) in LineVariants::new(line).enumerate() {
            if line_index > 0 || variant_index > 0 {
                expanded.push(LINE_DELIMITER);
            }
            expanded.push_str(&variant);
        }
    }

    expanded
}

/// Expand a single line (no line delimiter) into its variants
pub fn expand_line(line: &str) -> Vec<String> {
    LineVariants::new(line).collect()
}

/// Number of lines [`expand`] would produce, or `None` if it overflows `u128`
pub fn variant_count(compact: &str) -> Option<u128> {
    compact.split(LINE_DELIMITER).try_fold(0u128, |total, line| {
        let line_count = line
            .split(COLUMN_DELIMITER)
            .map(|column| column.split(VALUE_DELIMITER).count() as u128)
            .try_fold(1u128, |product, alternatives| product.checked_mul(alternatives))?;
        total.checked_add(line_count)
    })
}

/// Iterator over the variants of one line, in product order.
///
/// Walks the product like an odometer: the last column advances first and
/// carries into the column before it, which keeps memory flat regardless of
/// how many variants the line has.
pub struct LineVariants<'a> {
    columns: Vec<Vec<&'a str>>,
    positions: Vec<usize>,
    exhausted: bool,
}

impl<'a> LineVariants<'a> {
    pub fn new(line: &'a str) -> Self {
        // `split` always yields at least one piece, so a column without `|`
        // is a one-element set and an empty line is one empty variant
        let columns: Vec<Vec<&'a str>> = line
            .split(COLUMN_DELIMITER)
            .map(|column| column.split(VALUE_DELIMITER).collect())
            .collect();
        let positions = vec![0; columns.len()];

        Self {
            columns,
            positions,
            exhausted: false,
        }
    }

    fn current(&self) -> String {
        let mut variant = String::new();
        for (column_index, (alternatives, &position)) in
            self.columns.iter().zip(&self.positions).enumerate()
        {
            if column_index > 0 {
                variant.push(COLUMN_DELIMITER);
            }
            variant.push_str(alternatives[position]);
        }
        variant
    }

    fn advance(&mut self) {
        for column_index in (0..self.columns.len()).rev() {
            self.positions[column_index] += 1;
            if self.positions[column_index] < self.columns[column_index].len() {
                return;
            }
            self.positions[column_index] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for LineVariants<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }
        let variant = self.current();
        self.advance();
        Some(variant)
    }
}
