//! Dense GF(2) matrices with rows packed into u64 words.
//!
//! Supplies the linear algebra the transition engine needs: parsing a 0/1
//! matrix from text, rank by Gaussian elimination, inversion over GF(2),
//! Kronecker expansion to parallel branches, and block submatrix extraction.

use crate::AnalysisError;

/// A dense matrix over GF(2). Each row is a vector of u64 words, bit `c` of
/// the row living at word `c / 64`, bit position `c % 64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gf2Matrix {
    nrows: usize,
    ncols: usize,
    words: usize,
    rows: Vec<Vec<u64>>,
}

impl Gf2Matrix {
    /// All-zero matrix of the given shape. Zero rows or columns are allowed;
    /// the rank of such a matrix is 0.
    pub fn zero(nrows: usize, ncols: usize) -> Self {
        let words = ncols.div_ceil(64);
        Gf2Matrix {
            nrows,
            ncols,
            words,
            rows: vec![vec![0u64; words]; nrows],
        }
    }

    /// The n x n identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zero(n, n);
        for i in 0..n {
            m.set(i, i, true);
        }
        m
    }

    /// Parse a whitespace-delimited matrix of 0/1 characters. The column
    /// count is the length of the first token; tokens are concatenated and
    /// filled row-major, so line breaks inside a row are irrelevant.
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let first = tokens
            .first()
            .ok_or_else(|| AnalysisError::Parse("empty matrix input".into()))?;
        let n = first.len();
        if n == 0 {
            return Err(AnalysisError::Parse("empty matrix row".into()));
        }

        let mut bits = Vec::with_capacity(n * n);
        for token in &tokens {
            for ch in token.chars() {
                match ch {
                    '0' => bits.push(false),
                    '1' => bits.push(true),
                    other => {
                        return Err(AnalysisError::Parse(format!(
                            "unexpected character '{}' in matrix input",
                            other
                        )))
                    }
                }
            }
        }

        if bits.len() % n != 0 {
            return Err(AnalysisError::Parse(format!(
                "{} bits do not fill rows of width {}",
                bits.len(),
                n
            )));
        }
        let nrows = bits.len() / n;
        if nrows != n {
            return Err(AnalysisError::NotSquare {
                rows: nrows,
                cols: n,
            });
        }

        let mut m = Self::zero(nrows, n);
        for (i, bit) in bits.into_iter().enumerate() {
            if bit {
                m.set(i / n, i % n, true);
            }
        }
        Ok(m)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn get(&self, r: usize, c: usize) -> bool {
        (self.rows[r][c / 64] >> (c % 64)) & 1 == 1
    }

    pub fn set(&mut self, r: usize, c: usize, bit: bool) {
        if bit {
            self.rows[r][c / 64] |= 1u64 << (c % 64);
        } else {
            self.rows[r][c / 64] &= !(1u64 << (c % 64));
        }
    }

    /// Rank over GF(2) by forward elimination on the packed rows.
    pub fn rank(&self) -> usize {
        let mut rows = self.rows.clone();
        let mut pivots = 0;

        for col in 0..self.ncols {
            let word = col / 64;
            let mask = 1u64 << (col % 64);

            let found = (pivots..self.nrows).find(|&r| rows[r][word] & mask != 0);
            if let Some(r) = found {
                rows.swap(pivots, r);
                let pivot = rows[pivots].clone();
                for row in rows.iter_mut().skip(pivots + 1) {
                    if row[word] & mask != 0 {
                        for (dst, src) in row.iter_mut().zip(&pivot) {
                            *dst ^= *src;
                        }
                    }
                }
                pivots += 1;
                if pivots == self.nrows {
                    break;
                }
            }
        }

        pivots
    }

    /// Inverse over GF(2) via Gauss-Jordan on the augmented [A | I].
    /// Fails for non-square or singular input.
    pub fn inverse(&self) -> Result<Gf2Matrix, AnalysisError> {
        if self.nrows != self.ncols {
            return Err(AnalysisError::NotSquare {
                rows: self.nrows,
                cols: self.ncols,
            });
        }
        let n = self.nrows;
        let mut left = self.rows.clone();
        let mut right = Gf2Matrix::identity(n).rows;

        for col in 0..n {
            let word = col / 64;
            let mask = 1u64 << (col % 64);

            let pivot = (col..n).find(|&r| left[r][word] & mask != 0);
            let pivot = match pivot {
                Some(r) => r,
                None => return Err(AnalysisError::Singular),
            };
            left.swap(col, pivot);
            right.swap(col, pivot);

            let pl = left[col].clone();
            let pr = right[col].clone();
            for r in 0..n {
                if r != col && left[r][word] & mask != 0 {
                    for (dst, src) in left[r].iter_mut().zip(&pl) {
                        *dst ^= *src;
                    }
                    for (dst, src) in right[r].iter_mut().zip(&pr) {
                        *dst ^= *src;
                    }
                }
            }
        }

        Ok(Gf2Matrix {
            nrows: n,
            ncols: n,
            words: n.div_ceil(64),
            rows: right,
        })
    }

    /// Kronecker expansion to `k` parallel copies: each 1-entry becomes a
    /// k x k identity block, each 0-entry a k x k zero block.
    pub fn expand(&self, k: usize) -> Result<Gf2Matrix, AnalysisError> {
        if self.nrows != self.ncols {
            return Err(AnalysisError::NotSquare {
                rows: self.nrows,
                cols: self.ncols,
            });
        }
        let n = self.nrows;
        let mut big = Gf2Matrix::zero(n * k, n * k);
        for i in 0..n {
            for j in 0..n {
                if self.get(i, j) {
                    for d in 0..k {
                        big.set(i * k + d, j * k + d, true);
                    }
                }
            }
        }
        Ok(big)
    }

    /// Restrict to the selected row blocks and column blocks, concatenated in
    /// selection order. Block heights and widths are `nrows / row_take.len()`
    /// and `ncols / col_take.len()`. An empty selection on either side yields
    /// a 0-row or 0-column matrix rather than an error, so that the rank of
    /// the restriction stays well-defined.
    pub fn block_submatrix(&self, row_take: &[bool], col_take: &[bool]) -> Gf2Matrix {
        let row_block = self.nrows / row_take.len().max(1);
        let col_block = self.ncols / col_take.len().max(1);
        let out_rows = row_take.iter().filter(|&&b| b).count() * row_block;
        let out_cols = col_take.iter().filter(|&&b| b).count() * col_block;

        let mut sub = Gf2Matrix::zero(out_rows, out_cols);
        let mut dst_r = 0;
        for (br, &take_r) in row_take.iter().enumerate() {
            if !take_r {
                continue;
            }
            for dr in 0..row_block {
                let src_r = br * row_block + dr;
                let mut dst_c = 0;
                for (bc, &take_c) in col_take.iter().enumerate() {
                    if !take_c {
                        continue;
                    }
                    for dc in 0..col_block {
                        if self.get(src_r, bc * col_block + dc) {
                            sub.set(dst_r, dst_c, true);
                        }
                        dst_c += 1;
                    }
                }
                dst_r += 1;
            }
        }
        sub
    }

    /// Matrix product over GF(2).
    pub fn multiply(&self, other: &Gf2Matrix) -> Gf2Matrix {
        assert_eq!(self.ncols, other.nrows, "inner dimensions must agree");
        let mut out = Gf2Matrix::zero(self.nrows, other.ncols);
        for r in 0..self.nrows {
            for k in 0..self.ncols {
                if self.get(r, k) {
                    for (dst, src) in out.rows[r].iter_mut().zip(&other.rows[k]) {
                        *dst ^= *src;
                    }
                }
            }
        }
        out
    }

    /// Matrix-vector product over GF(2).
    pub fn mul_vec(&self, v: &[bool]) -> Vec<bool> {
        assert_eq!(self.ncols, v.len(), "vector length must match columns");
        (0..self.nrows)
            .map(|r| {
                let mut acc = false;
                for (c, &bit) in v.iter().enumerate() {
                    if bit && self.get(r, c) {
                        acc = !acc;
                    }
                }
                acc
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_get() {
        let m = Gf2Matrix::parse("110\n011\n101").unwrap();
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 3);
        assert!(m.get(0, 0) && m.get(0, 1) && !m.get(0, 2));
        assert!(!m.get(1, 0) && m.get(1, 1) && m.get(1, 2));
        assert!(m.get(2, 0) && !m.get(2, 1) && m.get(2, 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Gf2Matrix::parse("").is_err());
        assert!(Gf2Matrix::parse("10\n1x").is_err());
        // 3 rows of width 2 -- not square
        assert!(Gf2Matrix::parse("10 01 11").is_err());
    }

    #[test]
    fn test_rank() {
        assert_eq!(Gf2Matrix::identity(5).rank(), 5);
        // Row 2 = row 0 XOR row 1
        let m = Gf2Matrix::parse("110\n011\n101").unwrap();
        assert_eq!(m.rank(), 2);
        assert_eq!(Gf2Matrix::zero(4, 4).rank(), 0);
        assert_eq!(Gf2Matrix::zero(0, 3).rank(), 0);
        assert_eq!(Gf2Matrix::zero(3, 0).rank(), 0);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Gf2Matrix::parse("11\n01").unwrap();
        let inv = m.inverse().unwrap();
        assert_eq!(m.multiply(&inv), Gf2Matrix::identity(2));
        assert_eq!(inv.multiply(&m), Gf2Matrix::identity(2));
    }

    #[test]
    fn test_inverse_singular() {
        let m = Gf2Matrix::parse("11\n11").unwrap();
        assert!(matches!(m.inverse(), Err(AnalysisError::Singular)));
    }

    #[test]
    fn test_expand_identity_blocks() {
        let m = Gf2Matrix::parse("10\n01").unwrap();
        let big = m.expand(3).unwrap();
        assert_eq!(big, Gf2Matrix::identity(6));

        let m = Gf2Matrix::parse("01\n00").unwrap();
        let big = m.expand(2).unwrap();
        for r in 0..4 {
            for c in 0..4 {
                let expected = (r == 0 && c == 2) || (r == 1 && c == 3);
                assert_eq!(big.get(r, c), expected, "entry ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn test_block_submatrix() {
        // 4x4 split into 2x2 blocks of size 2
        let m = Gf2Matrix::parse("1100\n0110\n0011\n1001").unwrap();
        let sub = m.block_submatrix(&[true, false], &[false, true]);
        assert_eq!(sub.nrows(), 2);
        assert_eq!(sub.ncols(), 2);
        // Top-right block of m
        assert!(!sub.get(0, 0) && !sub.get(0, 1));
        assert!(sub.get(1, 0) && !sub.get(1, 1));
    }

    #[test]
    fn test_block_submatrix_empty_selection() {
        let m = Gf2Matrix::identity(4);
        let sub = m.block_submatrix(&[false, false], &[true, true]);
        assert_eq!(sub.nrows(), 0);
        assert_eq!(sub.ncols(), 4);
        assert_eq!(sub.rank(), 0);

        let sub = m.block_submatrix(&[true, true], &[false, false]);
        assert_eq!(sub.nrows(), 4);
        assert_eq!(sub.ncols(), 0);
        assert_eq!(sub.rank(), 0);
    }

    #[test]
    fn test_mul_vec() {
        let m = Gf2Matrix::parse("11\n01").unwrap();
        assert_eq!(m.mul_vec(&[true, false]), vec![true, false]);
        assert_eq!(m.mul_vec(&[false, true]), vec![true, true]);
        assert_eq!(m.mul_vec(&[true, true]), vec![false, true]);
    }
}
