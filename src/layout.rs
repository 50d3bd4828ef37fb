//! Justified row layout.
//!
//! Records are packed greedily into rows at a target height, singleton rows
//! past the first are folded into their predecessor, and every row is then
//! scaled uniformly so it spans the container exactly.

use crate::model::ImageRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub row_height: f64,
    pub spacing: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            row_height: 240.0,
            spacing: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowItem {
    pub record: ImageRecord,
    /// Width at the target row height, before row scaling.
    pub scaled_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub items: Vec<RowItem>,
    pub scale: f64,
    pub height: u32,
}

impl Row {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.items.iter().map(|item| &item.record)
    }

    /// Final on-screen width of each item.
    pub fn render_widths(&self) -> Vec<f64> {
        self.items
            .iter()
            .map(|item| item.scaled_width * self.scale)
            .collect()
    }

    fn natural_width(&self) -> f64 {
        self.items.iter().map(|item| item.scaled_width).sum()
    }
}

pub fn layout(records: &[ImageRecord], container_width: f64, params: LayoutParams) -> Vec<Row> {
    let mut groups = pack(records, container_width, params);
    merge_singletons(&mut groups);
    groups
        .into_iter()
        .map(|items| finish_row(items, container_width, params))
        .collect()
}

/// Greedy pass: a row takes records while they fit, and always takes one.
fn pack(records: &[ImageRecord], container_width: f64, params: LayoutParams) -> Vec<Vec<RowItem>> {
    let mut groups: Vec<Vec<RowItem>> = Vec::new();
    let mut current: Vec<RowItem> = Vec::new();
    let mut current_width = 0.0;

    for record in records {
        let scaled_width = params.row_height * record.aspect_ratio();
        let candidate = current_width + scaled_width + params.spacing * current.len() as f64;
        if !current.is_empty() && candidate > container_width {
            groups.push(std::mem::take(&mut current));
            current_width = 0.0;
        }
        current_width += scaled_width;
        current.push(RowItem {
            record: record.clone(),
            scaled_width,
        });
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Folds every singleton row after the first into the row before it.
fn merge_singletons(groups: &mut Vec<Vec<RowItem>>) {
    let mut index = groups.len();
    while index > 1 {
        index -= 1;
        if groups[index].len() == 1 {
            let orphan = groups.remove(index);
            groups[index - 1].extend(orphan);
        }
    }
}

fn finish_row(items: Vec<RowItem>, container_width: f64, params: LayoutParams) -> Row {
    let mut row = Row {
        items,
        scale: 1.0,
        height: 0,
    };
    let natural = row.natural_width();
    let gaps = params.spacing * row.len().saturating_sub(1) as f64;
    if natural > 0.0 {
        row.scale = ((container_width - gaps) / natural).max(0.0);
    }
    row.height = (params.row_height * row.scale).floor() as u32;
    row
}

/// Height of a row stack including inter-row spacing.
pub fn total_height(rows: &[Row], spacing: f64) -> f64 {
    let heights: f64 = rows.iter().map(|row| f64::from(row.height)).sum();
    heights + spacing * rows.len().saturating_sub(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PARAMS: LayoutParams = LayoutParams {
        row_height: 100.0,
        spacing: 10.0,
    };

    fn square(id: usize) -> ImageRecord {
        ImageRecord::new(format!("img{id}"), 500, 500)
    }

    fn records(dims: &[(u32, u32)]) -> Vec<ImageRecord> {
        dims.iter()
            .enumerate()
            .map(|(i, &(w, h))| ImageRecord::new(format!("img{i}"), w, h))
            .collect()
    }

    fn row_sizes(rows: &[Row]) -> Vec<usize> {
        rows.iter().map(Row::len).collect()
    }

    #[test]
    fn empty_input_has_no_rows() {
        assert!(layout(&[], 800.0, PARAMS).is_empty());
    }

    #[test]
    fn packs_until_overflow() {
        // Squares are 100 wide; 3 fit in 320 (300 + 2 gaps), a 4th would need 430.
        let input: Vec<_> = (0..6).map(square).collect();
        let rows = layout(&input, 320.0, PARAMS);
        assert_eq!(row_sizes(&rows), vec![3, 3]);
        assert!((rows[0].scale - 1.0).abs() < 1e-9);
        assert_eq!(rows[0].height, 100);
    }

    #[test]
    fn trailing_singleton_merges_into_previous_row() {
        let input: Vec<_> = (0..7).map(square).collect();
        let rows = layout(&input, 320.0, PARAMS);
        assert_eq!(row_sizes(&rows), vec![3, 4]);
        // 4 squares squeezed into 320 - 30 of content width.
        assert!((rows[1].scale - 290.0 / 400.0).abs() < 1e-9);
        assert_eq!(rows[1].height, 72);
    }

    #[test]
    fn oversized_item_gets_its_own_row() {
        let input = records(&[(5000, 500), (500, 500), (500, 500)]);
        let rows = layout(&input, 320.0, PARAMS);
        assert_eq!(row_sizes(&rows), vec![1, 2]);
        assert!(rows[0].scale < 1.0);
    }

    #[test]
    fn single_record_stays_alone() {
        let rows = layout(&[square(0)], 800.0, PARAMS);
        assert_eq!(row_sizes(&rows), vec![1]);
        assert_eq!(rows[0].render_widths(), vec![800.0]);
        assert_eq!(rows[0].height, 800);
    }

    #[test]
    fn narrow_container_pairs_up_from_the_tail() {
        let input: Vec<_> = (0..5).map(square).collect();
        let rows = layout(&input, 50.0, PARAMS);
        assert_eq!(row_sizes(&rows), vec![1, 2, 2]);
    }

    #[test]
    fn rows_fill_the_container() {
        let input = records(&[(1600, 900), (900, 1600), (1000, 1000), (3000, 1000), (800, 600)]);
        for row in layout(&input, 640.0, PARAMS) {
            let filled: f64 =
                row.render_widths().iter().sum::<f64>() + PARAMS.spacing * (row.len() - 1) as f64;
            assert!((filled - 640.0).abs() < 1e-6, "row filled {filled}");
        }
    }

    #[test]
    fn total_height_includes_gaps() {
        let input: Vec<_> = (0..6).map(square).collect();
        let rows = layout(&input, 320.0, PARAMS);
        assert_eq!(total_height(&rows, PARAMS.spacing), 210.0);
    }

    fn arb_records() -> impl Strategy<Value = Vec<ImageRecord>> {
        prop::collection::vec((1u32..4000, 1u32..4000), 0..60).prop_map(|dims| records(&dims))
    }

    proptest! {
        #[test]
        fn layout_is_deterministic(input in arb_records(), width in 100.0f64..2000.0) {
            prop_assert_eq!(layout(&input, width, PARAMS), layout(&input, width, PARAMS));
        }

        #[test]
        fn no_interior_singletons(input in arb_records(), width in 100.0f64..2000.0) {
            let rows = layout(&input, width, PARAMS);
            for row in rows.iter().skip(1) {
                prop_assert!(row.len() != 1);
            }
        }

        #[test]
        fn order_is_preserved(input in arb_records(), width in 100.0f64..2000.0) {
            let rows = layout(&input, width, PARAMS);
            let flattened: Vec<ImageRecord> = rows.iter().flat_map(|r| r.records().cloned()).collect();
            prop_assert_eq!(flattened, input);
        }

        #[test]
        fn packed_rows_fit_the_container(input in arb_records(), width in 100.0f64..2000.0) {
            let groups = pack(&input, width, PARAMS);
            for group in &groups {
                if group.len() < 2 {
                    continue;
                }
                let natural: f64 = group.iter().map(|item| item.scaled_width).sum();
                let gaps = PARAMS.spacing * (group.len() - 1) as f64;
                prop_assert!(natural + gaps <= width + 1e-9);
            }
            // Each row closed on overflow: its successor's first item did not fit.
            for pair in groups.windows(2) {
                let natural: f64 = pair[0].iter().map(|item| item.scaled_width).sum();
                let gaps = PARAMS.spacing * pair[0].len() as f64;
                prop_assert!(natural + pair[1][0].scaled_width + gaps > width);
            }
        }
    }
}
