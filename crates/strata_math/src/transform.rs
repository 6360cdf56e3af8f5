// Transform utilities for Mat4
//
// USD authors matrices as four rows of four numbers with the translation in
// the last row (row-vector convention). glam stores columns and multiplies
// column vectors, so a matrix read row by row has to be transposed once
// before glam can apply it.

use glam::Mat4;

use crate::Bounds;

/// Build a matrix whose rows are `rows`, in the order given.
pub fn mat4_from_rows(rows: &[[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols_array_2d(rows).transpose()
}

/// Inverse of [`mat4_from_rows`].
pub fn mat4_to_rows(matrix: &Mat4) -> [[f32; 4]; 4] {
    matrix.transpose().to_cols_array_2d()
}

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform bounds by transforming all 8 corners.
    fn transform_bounds(&self, bounds: &Bounds) -> Bounds;
}

impl Mat4Ext for Mat4 {
    fn transform_bounds(&self, bounds: &Bounds) -> Bounds {
        if bounds.is_empty() {
            return Bounds::EMPTY;
        }

        let mut result = Bounds::EMPTY;
        for corner in bounds.corners() {
            result.grow(self.transform_point3(corner));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    const USD_TRANSLATE: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [10.0, 20.0, 30.0, 1.0],
    ];

    #[test]
    fn test_rows_roundtrip() {
        let rows = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [13.0, 14.0, 15.0, 16.0],
        ];
        let matrix = mat4_from_rows(&rows);

        assert_eq!(matrix.row(0), Vec4::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(matrix.row(3), Vec4::new(13.0, 14.0, 15.0, 16.0));
        assert_eq!(mat4_to_rows(&matrix), rows);
    }

    #[test]
    fn test_double_transpose_is_identity() {
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 0.5),
            glam::Quat::from_rotation_z(0.3),
            Vec3::new(1.0, 2.0, 3.0),
        );
        assert_eq!(matrix.transpose().transpose(), matrix);
    }

    #[test]
    fn test_usd_rows_need_transpose() {
        let as_rows = mat4_from_rows(&USD_TRANSLATE);
        let normalized = as_rows.transpose();

        let moved = normalized.transform_point3(Vec3::ZERO);
        assert!((moved - Vec3::new(10.0, 20.0, 30.0)).length() < 0.001);

        // Without the transpose the translation lands in the projective row.
        let untouched = as_rows.transform_point3(Vec3::ZERO);
        assert!((untouched - Vec3::ZERO).length() < 0.001);
    }

    #[test]
    fn test_transform_bounds_translation() {
        let mat = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let bounds = Bounds::from_corners(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_bounds(&bounds);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_empty_bounds_stays_empty() {
        let mat = Mat4::from_translation(Vec3::ONE);
        assert!(mat.transform_bounds(&Bounds::EMPTY).is_empty());
    }
}
