// src/counts.rs
//
// Per-frame class tallies and the session-long table built from them.

use crate::types::Detection;
use std::collections::BTreeMap;

/// Class name -> occurrences within one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameCounts {
    counts: BTreeMap<String, u32>,
    // First-seen order of the classes, kept so table columns follow detection order
    order: Vec<String>,
}

impl FrameCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = Self::new();
        for det in detections {
            counts.add(&det.class_name, 1);
        }
        counts
    }

    pub fn add(&mut self, class_name: &str, n: u32) {
        match self.counts.get_mut(class_name) {
            Some(count) => *count += n,
            None => {
                self.counts.insert(class_name.to_string(), n);
                self.order.push(class_name.to_string());
            }
        }
    }

    pub fn get(&self, class_name: &str) -> u32 {
        self.counts.get(class_name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| c as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Classes in the order they were first counted.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<(S, u32)> for FrameCounts {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (name, n) in iter {
            counts.add(name.as_ref(), n);
        }
        counts
    }
}

/// One row per processed frame; columns are every class seen so far.
#[derive(Debug, Clone, Default)]
pub struct CountTable {
    columns: Vec<String>,
    rows: Vec<FrameCounts>,
}

impl CountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, counts: FrameCounts) {
        for class in counts.classes() {
            if !self.columns.iter().any(|c| c == class) {
                self.columns.push(class.to_string());
            }
        }
        self.rows.push(counts);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, class_name: &str) -> bool {
        self.columns.iter().any(|c| c == class_name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[FrameCounts] {
        &self.rows
    }

    pub fn column_sum(&self, class_name: &str) -> u64 {
        self.rows.iter().map(|row| row.get(class_name) as u64).sum()
    }

    /// Column-wise sums, in column order.
    pub fn totals(&self) -> Vec<(String, u64)> {
        self.columns
            .iter()
            .map(|c| (c.clone(), self.column_sum(c)))
            .collect()
    }

    pub fn grand_total(&self) -> u64 {
        self.rows.iter().map(FrameCounts::total).sum()
    }

    /// Header of class names, one line per frame, no index column.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_field(c)).collect();
        out.push_str(&header.join(","));
        out.push('\n');

        for row in &self.rows {
            let values: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).to_string())
                .collect();
            out.push_str(&values.join(","));
            out.push('\n');
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pairs: &[(&str, u32)]) -> FrameCounts {
        pairs.iter().map(|&(name, n)| (name, n)).collect()
    }

    fn det(class_name: &str) -> Detection {
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            confidence: 0.9,
            class_id: 0,
            class_name: class_name.to_string(),
        }
    }

    #[test]
    fn test_counts_from_detections() {
        let counts = FrameCounts::from_detections(&[det("car"), det("bus"), det("car")]);
        assert_eq!(counts.get("car"), 2);
        assert_eq!(counts.get("bus"), 1);
        assert_eq!(counts.get("truck"), 0);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.classes().collect::<Vec<_>>(), vec!["car", "bus"]);
    }

    #[test]
    fn test_columns_are_union_in_first_seen_order() {
        let mut table = CountTable::new();
        table.push(frame(&[("car", 3)]));
        table.push(frame(&[("bus", 1), ("car", 1)]));
        table.push(FrameCounts::new());
        table.push(frame(&[("motorcycle", 2)]));

        assert_eq!(table.columns(), &["car", "bus", "motorcycle"]);
        assert_eq!(table.row_count(), 4);
    }

    #[test]
    fn test_column_sum_matches_per_frame_counts() {
        let frames = vec![
            frame(&[("car", 4), ("bus", 1)]),
            frame(&[("car", 2)]),
            frame(&[("truck", 7), ("bus", 2)]),
            frame(&[]),
            frame(&[("car", 1), ("truck", 1)]),
        ];

        let mut table = CountTable::new();
        for f in &frames {
            table.push(f.clone());
        }

        for class in ["car", "bus", "truck", "motorcycle"] {
            let expected: u64 = frames.iter().map(|f| f.get(class) as u64).sum();
            assert_eq!(table.column_sum(class), expected, "class {}", class);
        }
        assert_eq!(table.grand_total(), 18);
        assert_eq!(
            table.totals(),
            vec![
                ("car".to_string(), 7),
                ("bus".to_string(), 3),
                ("truck".to_string(), 8)
            ]
        );
    }

    #[test]
    fn test_csv_fills_missing_with_zero() {
        let mut table = CountTable::new();
        table.push(frame(&[("car", 2)]));
        table.push(frame(&[("bus", 1)]));

        assert_eq!(table.to_csv(), "car,bus\n2,0\n0,1\n");
    }

    #[test]
    fn test_csv_has_one_line_per_frame() {
        let mut table = CountTable::new();
        for i in 0..12 {
            if i % 3 == 0 {
                table.push(FrameCounts::new());
            } else {
                table.push(frame(&[("car", i)]));
            }
        }

        let csv = table.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 1 + 12);
        assert_eq!(lines[1], "0");
    }

    #[test]
    fn test_csv_without_detections() {
        let mut table = CountTable::new();
        table.push(FrameCounts::new());
        table.push(FrameCounts::new());

        assert_eq!(table.to_csv(), "\n\n\n");
        assert_eq!(table.grand_total(), 0);
    }

    #[test]
    fn test_csv_quotes_odd_class_names() {
        let mut table = CountTable::new();
        table.push(frame(&[("van, small", 1), ("say \"hi\"", 2)]));

        assert_eq!(
            table.to_csv(),
            "\"van, small\",\"say \"\"hi\"\"\"\n1,2\n"
        );
    }
}
