//! CSV output for an assembled field.

use crate::error::Result;
use crate::grid::Grid;
use std::io::Write;

/// Write the field's interior as CSV, one row of cells per line, row 0
/// first. Halo cells, if any, are not written.
pub fn write_field_csv<W: Write>(field: &Grid, out: &mut W) -> Result<()> {
    for y in 0..field.height {
        let start = field.offset_of(0, y as isize);
        let row = &field.data[start..start + field.width];
        let line: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_rows_in_order() {
        let mut field = Grid::new(3, 2, 0).unwrap();
        field.data.copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.5, 6.0]);
        let mut out = Vec::new();
        write_field_csv(&field, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1,2,3\n4,5.5,6\n");
    }

    #[test]
    fn skips_halo_cells() {
        let mut field = Grid::new(2, 1, 1).unwrap();
        *field.cell_mut(0, 0) = 7.0;
        *field.cell_mut(1, 0) = 8.0;
        *field.cell_mut(-1, 0) = 99.0;
        let mut out = Vec::new();
        write_field_csv(&field, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "7,8\n");
    }
}
